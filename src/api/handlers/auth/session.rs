//! Stateless signed session tokens.
//!
//! Tokens are HS256 JWTs with `sub` (account id), a random `jti`, `iat`,
//! `exp`, and the configured issuer/audience, plus the account's role claim.
//! Verification distinguishes expired, bad-signature, and malformed tokens
//! so the orchestration layer can surface distinct outcomes. A verified
//! token with no role claim is treated as `USER` and logged as anomalous,
//! not rejected; peers predating the role claim still issue such tokens.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::roles::Role;

const DEFAULT_TTL_SECONDS: i64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionTokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token signature")]
    SignatureInvalid,
    #[error("Malformed token")]
    Malformed,
}

/// Claims carried by a session token.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    /// Role assertion, defaulting absent claims to `USER`.
    #[must_use]
    pub fn role(&self) -> Role {
        match self.role.as_deref().map(str::parse) {
            Some(Ok(role)) => role,
            Some(Err(_)) | None => {
                // Compatibility decision: tokens without a usable role claim
                // act as plain users rather than being rejected.
                warn!(sub = %self.sub, "session token missing role claim, defaulting to USER");
                Role::User
            }
        }
    }
}

/// Issues and verifies session tokens with a shared symmetric key.
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionSigner {
    #[must_use]
    pub fn new(secret: &SecretString, issuer: String, audience: String, expires_in: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            issuer,
            audience,
            ttl: parse_ttl(expires_in),
        }
    }

    /// Issue a token for the account, embedding its current role.
    ///
    /// The returned expiry is the same instant that went into the `exp`
    /// claim, so callers can report it without re-reading the clock.
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn issue(
        &self,
        account_id: &str,
        role: Role,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: account_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            role: Some(role.to_string()),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token, returning its claims or a three-way error.
    ///
    /// # Errors
    ///
    /// `Expired` for past-expiry tokens, `SignatureInvalid` for tampered or
    /// wrongly-keyed tokens, `Malformed` for everything else.
    pub fn verify(&self, token: &str) -> Result<Claims, SessionTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => SessionTokenError::Expired,
                ErrorKind::InvalidSignature => SessionTokenError::SignatureInvalid,
                _ => SessionTokenError::Malformed,
            })
    }
}

/// A freshly signed token and the expiry baked into its `exp` claim.
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Parse a suffix-based duration string (`45s`, `30m`, `2h`, `1d`).
/// Unrecognized suffixes and unparseable values fall back to 30 minutes.
fn parse_ttl(expires_in: &str) -> Duration {
    let trimmed = expires_in.trim();
    let seconds = trimmed.chars().last().and_then(|unit| {
        let value = trimmed.strip_suffix(unit)?.parse::<i64>().ok()?;
        match unit {
            's' => Some(value),
            'm' => Some(value * 60),
            'h' => Some(value * 60 * 60),
            'd' => Some(value * 24 * 60 * 60),
            _ => None,
        }
    });
    Duration::seconds(seconds.unwrap_or(DEFAULT_TTL_SECONDS))
}

/// Pull a bearer token from `Authorization: Bearer ...` or an `x-token` header.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty());
    if let Some(token) = from_authorization {
        return Some(token.to_string());
    }
    headers
        .get("x-token")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
