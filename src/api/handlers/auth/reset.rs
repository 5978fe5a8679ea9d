//! Password reset: request a token, then consume it.

use axum::{Json, extract::Extension, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::AuthState;
use super::password::hash_password;
use super::storage::{
    enqueue_email, find_user_by_email, find_user_by_reset_token, store_reset_token,
    update_password,
};
use super::types::{FlowResponse, ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{
    MIN_ONE_TIME_TOKEN_LEN, build_reset_url, generate_one_time_token, normalize_identifier,
};
use crate::api::response::ApiError;
use crate::api::email::templates;

const FORGOT_MESSAGE: &str = "If the email exists, a recovery link has been sent";
const INVALID_TOKEN: &str = "Invalid or expired reset token";

/// Start the reset flow. The response is identical whether or not the
/// account exists, and identical under any internal failure; nothing here
/// may leak account existence.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Accepted", body = FlowResponse),
        (status = 400, description = "Missing payload")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let email = normalize_identifier(&request.email);

    match find_user_by_email(&pool, &email).await {
        Ok(Some(user)) => {
            if let Err(err) = issue_reset_token(&pool, &state, &user).await {
                error!("failed to initiate password reset: {err:#}");
            }
        }
        Ok(None) => {}
        Err(err) => {
            error!("password reset lookup failed: {err:#}");
        }
    }

    Ok(Json(FlowResponse::ok(FORGOT_MESSAGE)))
}

async fn issue_reset_token(
    pool: &PgPool,
    state: &AuthState,
    user: &super::storage::UserRecord,
) -> anyhow::Result<()> {
    let token = generate_one_time_token()?;
    let reset_url = build_reset_url(state.config.frontend_base_url(), &token);
    store_reset_token(
        pool,
        user,
        &token,
        state.config.reset_token_ttl_seconds(),
        &reset_url,
    )
    .await
}

/// Consume a reset token and replace the stored password hash.
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = FlowResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.len() < MIN_ONE_TIME_TOKEN_LEN {
        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
    }
    if !super::utils::valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters with upper and lower case letters and a digit"
                .to_string(),
        ));
    }

    // Unknown and expired tokens collapse into one message.
    let Some(user) = find_user_by_reset_token(&pool, token).await? else {
        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
    };

    let password_hash = hash_password(&request.password)?;
    update_password(&pool, user.id, &password_hash).await?;

    // Confirmation email is best-effort; the password is already changed.
    if let Err(err) = enqueue_email(
        &*pool,
        &user.email,
        templates::PASSWORD_CHANGED,
        &json!({ "name": user.name }),
    )
    .await
    {
        error!("failed to queue password-changed email: {err:#}");
    }

    Ok(Json(FlowResponse::ok("Password updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::http::StatusCode;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn forgot_password_missing_payload() -> Result<()> {
        let config = crate::api::handlers::auth::AuthConfig::new(
            secrecy::SecretString::from("0123456789abcdef0123456789abcdef"),
            "https://app.example.com".to_string(),
        );
        let state = Arc::new(AuthState::from_config(config)?);
        let response = forgot_password(Extension(lazy_pool()?), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_short_token_rejected_before_lookup() -> Result<()> {
        let response = reset_password(
            Extension(lazy_pool()?),
            Some(Json(ResetPasswordRequest {
                token: "short".to_string(),
                password: "Passw0rd!".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_rejects_weak_password() -> Result<()> {
        let token = "a".repeat(43);
        let response = reset_password(
            Extension(lazy_pool()?),
            Some(Json(ResetPasswordRequest {
                token,
                password: "weak".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
