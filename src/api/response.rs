//! Error taxonomy and the user-visible failure envelope.
//!
//! Store-layer errors are wrapped into `ApiError` before they reach the
//! transport boundary; handlers never let raw sqlx errors escape. Security
//! sensitive flows collapse distinguishable internal causes into one outward
//! message (see login and the one-time token paths), while still picking the
//! right status class. Unexpected errors carry a correlation id and timestamp
//! so support can find the matching log line without leaking internals.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use ulid::Ulid;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Duplicate unique field.
    #[error("{0}")]
    Conflict(String),
    /// Bad credentials or an invalid/expired token.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Account exists but is disabled.
    #[error("{0}")]
    Locked(String),
    /// A downstream dependency (email, image store, peer service) failed.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Anything unexpected. The cause is logged, never surfaced.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure body shared by every error response: a success flag and a
/// human-readable message, plus correlation fields for unexpected errors.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Internal(err) => {
                let error_id = Ulid::new().to_string();
                error!(error_id, "unexpected error: {err:?}");
                ErrorBody {
                    success: false,
                    message: "Unexpected error, please try again later".to_string(),
                    error_id: Some(error_id),
                    timestamp: Some(Utc::now().to_rfc3339()),
                }
            }
            other => ErrorBody {
                success: false,
                message: other.to_string(),
                error_id: None,
                timestamp: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::Validation(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict(String::new()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Unauthorized(String::new()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden(String::new()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound(String::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Locked(String::new()).status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            ApiError::ServiceUnavailable(String::new()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_cause() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn visible_errors_keep_their_message() {
        let body = serde_json::to_value(ErrorBody {
            success: false,
            message: "Invalid credentials".to_string(),
            error_id: None,
            timestamp: None,
        })
        .expect("serializes");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid credentials");
        assert!(body.get("error_id").is_none());
    }
}
