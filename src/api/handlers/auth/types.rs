//! Request/response types for auth and user endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: PublicUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Email address or username.
    pub identifier: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

/// Minimal profile returned alongside a fresh session token.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Plain success envelope used by the email-driven flows.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowResponse {
    pub success: bool,
    pub message: String,
}

impl FlowResponse {
    #[must_use]
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub success: bool,
    pub user: PublicUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<PublicUser>,
}

/// Public projection of an account; never carries the password hash.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub profile_picture: String,
    pub role: String,
    pub status: bool,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for PublicUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            surname: record.surname,
            username: record.username,
            email: record.email,
            phone: record.phone,
            profile_picture: record.profile_picture,
            role: record.role,
            status: record.status,
            is_email_verified: record.email_verified,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    fn sample_record() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            surname: "Doe".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            status: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            phone: "12345678".to_string(),
            profile_picture: "https://cdn.example.com/a.png".to_string(),
            email_verified: true,
            role: "USER".to_string(),
        }
    }

    #[test]
    fn public_projection_drops_the_hash() -> Result<()> {
        let user = PublicUser::from(sample_record());
        let value = serde_json::to_value(&user)?;
        assert!(value.get("password_hash").is_none());
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        Ok(())
    }

    #[test]
    fn register_request_defaults_optional_fields() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "name": "Bob",
            "surname": "Roe",
            "username": "bob",
            "email": "bob@example.com",
            "password": "Sup3rSecret"
        }))?;
        assert!(request.phone.is_none());
        assert!(request.profile_picture.is_none());
        Ok(())
    }

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            identifier: "alice".to_string(),
            password: "Sup3rSecret".to_string(),
        };
        let decoded: LoginRequest = serde_json::from_value(serde_json::to_value(&request)?)?;
        assert_eq!(decoded.identifier, "alice");
        Ok(())
    }
}
