//! Account lifecycle: registration, login, email verification, password
//! reset, and role management.

pub mod login;
pub mod password;
pub mod register;
pub mod reset;
pub mod roles;
pub mod seed;
pub mod session;
pub mod storage;
pub mod types;
pub mod utils;
pub mod verification;

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

use crate::api::avatar::{AvatarStore, DefaultAvatarStore, HttpAvatarStore};
use crate::api::email::{EmailSender, LogEmailSender};
use session::SessionSigner;

/// Credentials for the administrator seeded at startup.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub username: String,
    pub password: SecretString,
}

/// Runtime configuration for the authentication subsystem.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    jwt_issuer: String,
    jwt_audience: String,
    jwt_expires_in: String,
    frontend_base_url: String,
    verification_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    default_avatar_url: String,
    image_store_url: Option<String>,
    bootstrap_admin: Option<BootstrapAdmin>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString, frontend_base_url: String) -> Self {
        Self {
            jwt_secret,
            jwt_issuer: "custodia".to_string(),
            jwt_audience: "custodia-clients".to_string(),
            jwt_expires_in: "30m".to_string(),
            frontend_base_url,
            verification_token_ttl_seconds: 86_400,
            reset_token_ttl_seconds: 3_600,
            default_avatar_url: String::new(),
            image_store_url: None,
            bootstrap_admin: None,
        }
    }

    #[must_use]
    pub fn with_jwt_issuer(mut self, issuer: String) -> Self {
        self.jwt_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_jwt_audience(mut self, audience: String) -> Self {
        self.jwt_audience = audience;
        self
    }

    #[must_use]
    pub fn with_jwt_expires_in(mut self, expires_in: String) -> Self {
        self.jwt_expires_in = expires_in;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_default_avatar_url(mut self, url: String) -> Self {
        self.default_avatar_url = url;
        self
    }

    #[must_use]
    pub fn with_image_store_url(mut self, url: Option<String>) -> Self {
        self.image_store_url = url;
        self
    }

    #[must_use]
    pub fn with_bootstrap_admin(
        mut self,
        email: String,
        username: String,
        password: SecretString,
    ) -> Self {
        self.bootstrap_admin = Some(BootstrapAdmin {
            email,
            username,
            password,
        });
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    #[must_use]
    pub const fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn default_avatar_url(&self) -> &str {
        &self.default_avatar_url
    }

    #[must_use]
    pub fn bootstrap_admin(&self) -> Option<&BootstrapAdmin> {
        self.bootstrap_admin.as_ref()
    }
}

/// Shared per-request state for the auth handlers.
pub struct AuthState {
    pub config: AuthConfig,
    pub signer: SessionSigner,
    pub emailer: Arc<dyn EmailSender>,
    pub avatars: Arc<dyn AvatarStore>,
}

impl AuthState {
    /// Build the state from configuration, wiring the avatar store to the
    /// external image service when one is configured.
    pub fn from_config(config: AuthConfig) -> Result<Self> {
        let signer = SessionSigner::new(
            &config.jwt_secret,
            config.jwt_issuer.clone(),
            config.jwt_audience.clone(),
            &config.jwt_expires_in,
        );
        let avatars: Arc<dyn AvatarStore> = match &config.image_store_url {
            Some(url) => Arc::new(HttpAvatarStore::new(url, &config.default_avatar_url)?),
            None => Arc::new(DefaultAvatarStore::new(&config.default_avatar_url)),
        };
        Ok(Self {
            config,
            signer,
            emailer: Arc::new(LogEmailSender),
            avatars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("0123456789abcdef0123456789abcdef"),
            "https://app.example.com".to_string(),
        )
    }

    #[test]
    fn config_defaults() {
        let config = base_config();
        assert_eq!(config.verification_token_ttl_seconds(), 86_400);
        assert_eq!(config.reset_token_ttl_seconds(), 3_600);
        assert_eq!(config.frontend_base_url(), "https://app.example.com");
        assert!(config.bootstrap_admin().is_none());
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = base_config()
            .with_jwt_issuer("idp".to_string())
            .with_verification_token_ttl_seconds(120)
            .with_reset_token_ttl_seconds(60)
            .with_bootstrap_admin(
                "root@example.com".to_string(),
                "root".to_string(),
                SecretString::from("Sup3rSecret"),
            );
        assert_eq!(config.jwt_issuer, "idp");
        assert_eq!(config.verification_token_ttl_seconds(), 120);
        assert_eq!(config.reset_token_ttl_seconds(), 60);
        let admin = config.bootstrap_admin().unwrap();
        assert_eq!(admin.username, "root");
    }

    #[test]
    fn state_builds_signer_from_config() {
        let state = AuthState::from_config(base_config()).unwrap();
        assert_eq!(state.config.frontend_base_url(), "https://app.example.com");
    }
}
