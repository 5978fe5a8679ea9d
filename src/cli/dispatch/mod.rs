//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action,
//! such as starting the API server with its full configuration state.

use crate::cli::commands::{auth, email};
use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
///
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        jwt_issuer: auth_opts.jwt_issuer,
        jwt_audience: auth_opts.jwt_audience,
        jwt_expires_in: auth_opts.jwt_expires_in,
        frontend_base_url: auth_opts.frontend_base_url,
        verification_token_ttl_seconds: auth_opts.verification_token_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        default_avatar_url: auth_opts.default_avatar_url,
        image_store_url: auth_opts.image_store_url,
        admin_email: auth_opts.admin_email,
        admin_username: auth_opts.admin_username,
        admin_password: auth_opts.admin_password,
        email_outbox_poll_seconds: email_opts.poll_seconds,
        email_outbox_batch_size: email_opts.batch_size,
        email_outbox_max_attempts: email_opts.max_attempts,
        email_outbox_backoff_base_seconds: email_opts.backoff_base_seconds,
        email_outbox_backoff_max_seconds: email_opts.backoff_max_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                (
                    "CUSTODIA_DSN",
                    Some("postgres://localhost:5432/custodia_test"),
                ),
                ("CUSTODIA_JWT_SECRET", Some("dispatch-secret")),
                ("CUSTODIA_ADMIN_PASSWORD", Some("dispatch-admin")),
                ("CUSTODIA_PORT", Some("9090")),
            ],
            || {
                let matches = crate::cli::commands::new()
                    .try_get_matches_from(["custodia"])
                    .expect("matches should parse");
                let Action::Server(args) = handler(&matches).expect("handler should succeed");
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost:5432/custodia_test");
                assert_eq!(args.jwt_secret.expose_secret(), "dispatch-secret");
                assert_eq!(args.jwt_expires_in, "30m");
                assert_eq!(args.verification_token_ttl_seconds, 86_400);
                assert_eq!(args.reset_token_ttl_seconds, 3_600);
            },
        );
    }
}
