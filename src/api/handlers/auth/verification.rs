//! Email verification and resend endpoints.

use axum::{Json, extract::Extension, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::AuthState;
use super::storage::{
    enqueue_email, find_user_by_email, find_user_by_verification_token, mark_email_verified,
    set_verification_token,
};
use super::types::{FlowResponse, ResendVerificationRequest, VerifyEmailRequest};
use super::utils::{
    MIN_ONE_TIME_TOKEN_LEN, build_verify_url, generate_one_time_token, normalize_identifier,
    valid_email,
};
use crate::api::email::{EmailMessage, templates};
use crate::api::response::ApiError;

const INVALID_TOKEN: &str = "Invalid or expired verification token";

/// Consume a verification token: mark the email verified and activate the
/// account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = FlowResponse),
        (status = 400, description = "Already verified or missing payload"),
        (status = 401, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    // Length gate before any store work; the store match below is the sole
    // authority on token validity.
    let token = request.token.trim();
    if token.len() < MIN_ONE_TIME_TOKEN_LEN {
        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
    }

    // Expired and unknown tokens produce the same message on purpose.
    let Some(user) = find_user_by_verification_token(&pool, token).await? else {
        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
    };
    if user.email_verified {
        return Err(ApiError::Validation("Email already verified".to_string()));
    }

    mark_email_verified(&pool, user.id).await?;

    // Welcome email is best-effort; the account is already active.
    if let Err(err) = enqueue_email(
        &*pool,
        &user.email,
        templates::WELCOME,
        &json!({ "name": user.name }),
    )
    .await
    {
        error!("failed to queue welcome email: {err:#}");
    }

    Ok(Json(FlowResponse::ok(
        "Email verified successfully. You can now log in.",
    )))
}

/// Issue a fresh verification token and send it synchronously.
///
/// Unlike the other flows this one awaits delivery: resending is the user's
/// recovery action, so a send failure must be surfaced, not swallowed.
#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification email sent", body = FlowResponse),
        (status = 400, description = "Already verified or invalid email"),
        (status = 404, description = "Account not found"),
        (status = 503, description = "Email delivery failed")
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let email = normalize_identifier(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }

    let Some(user) = find_user_by_email(&pool, &email).await? else {
        return Err(ApiError::NotFound("Account not found".to_string()));
    };
    if user.email_verified {
        return Err(ApiError::Validation("Email already verified".to_string()));
    }

    let token = generate_one_time_token()?;
    set_verification_token(
        &pool,
        user.id,
        &token,
        state.config.verification_token_ttl_seconds(),
    )
    .await?;

    let verify_url = build_verify_url(state.config.frontend_base_url(), &token);
    let message = EmailMessage {
        to_email: user.email,
        template: templates::VERIFY_EMAIL.to_string(),
        payload_json: json!({ "name": user.name, "verify_url": verify_url }).to_string(),
    };
    if let Err(err) = state.emailer.send(&message) {
        error!("verification resend delivery failed: {err:#}");
        return Err(ApiError::ServiceUnavailable(
            "Could not send the verification email. Please try again later.".to_string(),
        ));
    }

    Ok(Json(FlowResponse::ok("Verification email sent")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::AuthConfig;
    use anyhow::Result;
    use axum::http::StatusCode;
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
    async fn verify_email_missing_payload() -> Result<()> {
        let response = verify_email(Extension(lazy_pool()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_short_token_rejected_before_lookup() -> Result<()> {
        let response = verify_email(
            Extension(lazy_pool()?),
            Some(Json(VerifyEmailRequest {
                token: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn resend_rejects_invalid_email() -> Result<()> {
        let response = resend_verification(
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(ResendVerificationRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
