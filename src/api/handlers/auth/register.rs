//! Account registration.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::AuthState;
use super::password::hash_password;
use super::storage::{NewAccount, SignupOutcome, create_account, user_exists};
use super::types::{PublicUser, RegisterRequest, RegisterResponse};
use super::utils::{normalize_identifier, valid_email, valid_password, valid_phone};
use crate::api::response::ApiError;

/// Create an inactive account and queue the verification email.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification pending", body = RegisterResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email or username already taken")
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let name = request.name.trim();
    let surname = request.surname.trim();
    let username = normalize_identifier(&request.username);
    let email = normalize_identifier(&request.email);
    if name.is_empty() || surname.is_empty() || username.is_empty() {
        return Err(ApiError::Validation(
            "Name, surname and username are required".to_string(),
        ));
    }
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters with upper and lower case letters and a digit"
                .to_string(),
        ));
    }
    let phone = request.phone.as_deref().map(str::trim).unwrap_or_default();
    if !phone.is_empty() && !valid_phone(phone) {
        return Err(ApiError::Validation("Invalid phone number".to_string()));
    }

    if user_exists(&pool, &email, &username).await? {
        return Err(ApiError::Conflict(
            "An account with this email or username already exists".to_string(),
        ));
    }

    // Avatar resolution never blocks registration; failures fall back to the
    // default URL inside the store.
    let profile_picture = state
        .avatars
        .resolve(request.profile_picture.as_deref())
        .await;

    let password_hash = hash_password(&request.password)?;
    let account = NewAccount {
        name: name.to_string(),
        surname: surname.to_string(),
        username,
        email,
        password_hash,
        phone: phone.to_string(),
        profile_picture,
    };

    match create_account(&pool, &account, &state.config).await? {
        SignupOutcome::Created(record) => Ok((
            StatusCode::CREATED,
            Json(RegisterResponse {
                success: true,
                message: "Account created. Please verify your email to activate it."
                    .to_string(),
                user: PublicUser::from(*record),
            }),
        )),
        // The unique index caught a concurrent signup the earlier check missed.
        SignupOutcome::Conflict => Err(ApiError::Conflict(
            "An account with this email or username already exists".to_string(),
        )),
    }
}
