use crate::api::{self, email::EmailWorkerConfig, handlers::auth::AuthConfig};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expires_in: String,
    pub frontend_base_url: String,
    pub verification_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub default_avatar_url: String,
    pub image_store_url: Option<String>,
    pub admin_email: String,
    pub admin_username: String,
    pub admin_password: SecretString,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the database is unreachable, seeding fails, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.jwt_secret, args.frontend_base_url)
        .with_jwt_issuer(args.jwt_issuer)
        .with_jwt_audience(args.jwt_audience)
        .with_jwt_expires_in(args.jwt_expires_in)
        .with_verification_token_ttl_seconds(args.verification_token_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_default_avatar_url(args.default_avatar_url)
        .with_image_store_url(args.image_store_url)
        .with_bootstrap_admin(args.admin_email, args.admin_username, args.admin_password);

    let email_config = EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::serve(args.port, args.dsn, auth_config, email_config).await
}
