//! Small helpers for auth validation and one-time token handling.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;

/// Shortest one-time token the service will even look up. The store match
/// (token value plus unexpired) is the sole validity authority beyond this.
pub(crate) const MIN_ONE_TIME_TOKEN_LEN: usize = 40;

/// Normalize an email or username for lookup/uniqueness checks.
pub(crate) fn normalize_identifier(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Password policy: at least 8 characters with an upper, a lower, and a digit.
pub(crate) fn valid_password(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Phone numbers are fixed-length numeric strings (8 digits).
pub(crate) fn valid_phone(phone: &str) -> bool {
    phone.len() == 8 && phone.chars().all(|c| c.is_ascii_digit())
}

/// Create a one-time token for email verification or password reset links.
///
/// 32 random bytes, base64url without padding. The two purposes are
/// distinguished only by which store column holds the token, never by
/// token content.
pub(crate) fn generate_one_time_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate one-time token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Build the frontend verification link included in outbound emails.
pub(crate) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email?token={token}")
}

/// Build the frontend password reset link included in outbound emails.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
