//! Credential login issuing session tokens.

use axum::{Json, extract::Extension, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;

use super::AuthState;
use super::password::verify_password;
use super::roles::Role;
use super::storage::find_user_by_identifier;
use super::types::{LoginRequest, LoginResponse, SessionUser};
use super::utils::normalize_identifier;
use crate::api::response::ApiError;

/// Well-formed record that matches no real password. Verified on the
/// unknown-user path so both failure branches cost one argon2 computation.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=102400,t=2,p=8$c2FsdHNhbHRzYWx0c2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Authenticate by email or username and return a session token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email not verified"),
        (status = 423, description = "Account disabled")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let identifier = normalize_identifier(&request.identifier);
    if identifier.is_empty() || request.password.is_empty() {
        return Err(ApiError::Validation(
            "Identifier and password are required".to_string(),
        ));
    }

    let Some(user) = find_user_by_identifier(&pool, &identifier).await? else {
        let _ = verify_password(DUMMY_HASH, &request.password);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    if !verify_password(&user.password_hash, &request.password) {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }
    if !user.email_verified {
        return Err(ApiError::Forbidden(
            "You must verify your email before logging in".to_string(),
        ));
    }
    if !user.status {
        return Err(ApiError::Locked("Your account is disabled".to_string()));
    }

    let role = user.role.parse::<Role>().unwrap_or(Role::User);
    let issued = state
        .signer
        .issue(&user.id.to_string(), role)
        .map_err(|err| ApiError::Internal(err.into()))?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token: issued.token,
        expires_at: issued.expires_at,
        user: SessionUser {
            id: user.id,
            username: user.username,
            profile_picture: user.profile_picture,
            role: role.to_string(),
        },
    }))
}
