use super::handlers::{auth, health, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// New endpoints go through `.routes(routes!(...))` so the route table and the
/// document never drift apart.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::resend_verification))
        .routes(routes!(auth::reset::forgot_password))
        .routes(routes!(auth::reset::reset_password))
        .routes(routes!(users::get_user))
        .routes(routes!(users::list_users))
        .routes(routes!(users::set_user_role));

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login and account recovery".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Account lookup and role management".to_string());

    router.get_openapi_mut().tags = Some(vec![auth_tag, users_tag]);

    router
}

/// Seed the document info block from Cargo.toml metadata.
fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let description = non_empty(env!("CARGO_PKG_DESCRIPTION"));

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(description)
        .build();

    info.contact = cargo_contact();
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|id| {
        let mut license = License::new(id);
        license.identifier = Some(id.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

/// First Cargo author, split into `Name <email>` parts when present.
fn cargo_contact() -> Option<Contact> {
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next()?.trim();

    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (
            non_empty(name),
            non_empty(rest.trim_end_matches('>')).map(str::trim),
        ),
        None => (non_empty(primary), None),
    };

    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(|s| s.trim().to_string());
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Custodia"));
            assert_eq!(contact.email.as_deref(), Some("team@custodia.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "users"));
        assert!(spec.paths.paths.contains_key("/api/v1/auth/register"));
        assert!(spec.paths.paths.contains_key("/api/v1/auth/reset-password"));
        assert!(spec.paths.paths.contains_key("/api/v1/users/{id}/role"));
    }
}
