//! User lookup and role management endpoints.
//!
//! The single-user lookup is public: peer services poll it to validate that
//! an account referenced in their data still exists. Listing and role
//! reassignment require an ADMIN session token.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use super::auth::AuthState;
use super::auth::roles::{Role, RoleChange, set_role};
use super::auth::session::{SessionTokenError, extract_bearer_token};
use super::auth::storage::{UserRecord, find_user_by_id, list_users_by_role};
use super::auth::types::{PublicUser, SetRoleRequest, UserListResponse, UserResponse};
use crate::api::response::ApiError;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Restrict the listing to one role (ADMIN or USER).
    pub role: Option<String>,
}

/// Verify the bearer token and load its account, requiring the ADMIN role.
async fn require_admin(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<UserRecord, ApiError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(ApiError::Unauthorized("Missing session token".to_string()));
    };
    let claims = state.signer.verify(&token).map_err(|err| match err {
        SessionTokenError::Expired => ApiError::Unauthorized("Session expired".to_string()),
        SessionTokenError::SignatureInvalid | SessionTokenError::Malformed => {
            ApiError::Unauthorized("Invalid session token".to_string())
        }
    })?;
    let account_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthorized("Invalid session token".to_string()))?;
    let Some(account) = find_user_by_id(pool, account_id).await? else {
        return Err(ApiError::Unauthorized(
            "Session account no longer exists".to_string(),
        ));
    };
    if !account.status {
        return Err(ApiError::Locked("Your account is disabled".to_string()));
    }
    if claims.role() != Role::Admin {
        return Err(ApiError::Forbidden(
            "Administrator role required".to_string(),
        ));
    }
    Ok(account)
}

/// Public account projection by id.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account found", body = UserResponse),
        (status = 404, description = "No such account")
    ),
    tag = "users"
)]
pub async fn get_user(
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = find_user_by_id(&pool, id).await? else {
        return Err(ApiError::NotFound("Account not found".to_string()));
    };
    Ok(Json(UserResponse {
        success: true,
        user: PublicUser::from(user),
    }))
}

/// Admin-only listing, optionally filtered by role.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Accounts", body = UserListResponse),
        (status = 401, description = "Missing or invalid session token"),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, &pool, &state).await?;

    let roles = match query.role {
        Some(name) => {
            let role = name
                .parse::<Role>()
                .map_err(|_| ApiError::Validation(format!("Unknown role: {name}")))?;
            vec![role]
        }
        None => vec![Role::Admin, Role::User],
    };

    let mut users = Vec::new();
    for role in roles {
        users.extend(
            list_users_by_role(&pool, role)
                .await?
                .into_iter()
                .map(PublicUser::from),
        );
    }
    Ok(Json(UserListResponse {
        success: true,
        users,
    }))
}

/// Admin-only role reassignment, guarded by the admin-floor invariant.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/role",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 400, description = "Unknown role name"),
        (status = 404, description = "No such account"),
        (status = 409, description = "Would remove the last administrator")
    ),
    tag = "users"
)]
pub async fn set_user_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<SetRoleRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, &pool, &state).await?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let role = request
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::Validation(format!("Unknown role: {}", request.role)))?;

    match set_role(&pool, id, role).await? {
        RoleChange::Updated(record) => Ok(Json(UserResponse {
            success: true,
            user: PublicUser::from(*record),
        })),
        RoleChange::LastAdmin => Err(ApiError::Conflict(
            "Cannot remove the last administrator".to_string(),
        )),
        RoleChange::UserNotFound => Err(ApiError::NotFound("Account not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::AuthConfig;
    use anyhow::Result;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new(
            SecretString::from("0123456789abcdef0123456789abcdef"),
            "https://app.example.com".to_string(),
        );
        Arc::new(AuthState::from_config(config).unwrap())
    }

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn list_users_requires_a_token() -> Result<()> {
        let response = list_users(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Query(ListUsersQuery { role: None }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn set_role_rejects_garbage_tokens() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert("x-token", "not-a-jwt".parse()?);
        let response = set_user_role(
            headers,
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Path(Uuid::new_v4()),
            Some(Json(SetRoleRequest {
                role: "USER".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
