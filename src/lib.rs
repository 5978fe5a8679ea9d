//! # Custodia (Identity & Authentication Service)
//!
//! `custodia` is the identity authority for the platform. It owns account
//! lifecycle (registration, email verification, password reset), credential
//! verification, role assignment, and session token issuance. Content
//! services trust identities asserted here and validate account ids through
//! the public users endpoint.
//!
//! ## Credentials
//!
//! Passwords are hashed with Argon2id using fixed parameters
//! (`m=102400, t=2, p=8`, 32-byte digest, 16-byte salt) so hashes stay
//! portable across independent implementations of the same algorithm family.
//! Verification falls back to recomputing the digest from the parameters
//! embedded in the stored record when the native decoder rejects a
//! peer-produced encoding.
//!
//! ## Tokens
//!
//! - **One-time tokens** (email verification, password reset) are 32 random
//!   bytes, base64url without padding, stored server-side and single-use.
//!   The store lookup (token match plus unexpired) is the sole validity
//!   authority.
//! - **Session tokens** are HS256-signed JWTs carrying `sub`, `jti`, `iat`,
//!   `exp`, issuer, audience, and the account's role.
//!
//! ## Email
//!
//! Outbound email rides a transactional outbox: flows that already persisted
//! their token durably enqueue a row and return, a background worker delivers
//! with retries. Resending a verification email is the one synchronous path,
//! since resend is itself the recovery action and must report its own failure.

pub mod api;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
