use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_token_args(command);
    with_bootstrap_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("Shared secret for signing session tokens")
                .env("CUSTODIA_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("jwt-issuer")
                .long("jwt-issuer")
                .help("Issuer claim for session tokens")
                .env("CUSTODIA_JWT_ISSUER")
                .default_value("custodia"),
        )
        .arg(
            Arg::new("jwt-audience")
                .long("jwt-audience")
                .help("Audience claim for session tokens")
                .env("CUSTODIA_JWT_AUDIENCE")
                .default_value("custodia-clients"),
        )
        .arg(
            Arg::new("jwt-expires-in")
                .long("jwt-expires-in")
                .help("Session token lifetime, e.g. 30m, 2h, 1d (default 30m)")
                .env("CUSTODIA_JWT_EXPIRES_IN")
                .default_value("30m"),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for verification and reset links")
                .env("CUSTODIA_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("verification-token-ttl-seconds")
                .long("verification-token-ttl-seconds")
                .help("Email verification token TTL in seconds")
                .env("CUSTODIA_VERIFICATION_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("CUSTODIA_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("default-avatar-url")
                .long("default-avatar-url")
                .help("Avatar URL assigned when no profile picture is provided or an upload fails")
                .env("CUSTODIA_DEFAULT_AVATAR_URL")
                .default_value("https://cdn.custodia.dev/avatars/default.png"),
        )
        .arg(
            Arg::new("image-store-url")
                .long("image-store-url")
                .help("External image store upload endpoint (optional)")
                .env("CUSTODIA_IMAGE_STORE_URL"),
        )
}

fn with_bootstrap_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("admin-email")
                .long("admin-email")
                .help("Email of the bootstrap administrator account")
                .env("CUSTODIA_ADMIN_EMAIL")
                .default_value("admin@custodia.dev"),
        )
        .arg(
            Arg::new("admin-username")
                .long("admin-username")
                .help("Username of the bootstrap administrator account")
                .env("CUSTODIA_ADMIN_USERNAME")
                .default_value("custodia-admin"),
        )
        .arg(
            Arg::new("admin-password")
                .long("admin-password")
                .help("Password of the bootstrap administrator account")
                .env("CUSTODIA_ADMIN_PASSWORD")
                .required(true),
        )
}

#[derive(Debug)]
pub struct Options {
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
}

impl Options {
    /// Extract auth options from parsed CLI matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>("jwt-secret")
            .cloned()
            .context("missing required argument: --jwt-secret")?;
        let admin_password = matches
            .get_one::<String>("admin-password")
            .cloned()
            .context("missing required argument: --admin-password")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            jwt_issuer: string_arg(matches, "jwt-issuer"),
            jwt_audience: string_arg(matches, "jwt-audience"),
            jwt_expires_in: string_arg(matches, "jwt-expires-in"),
            frontend_base_url: string_arg(matches, "frontend-base-url"),
            verification_token_ttl_seconds: matches
                .get_one::<i64>("verification-token-ttl-seconds")
                .copied()
                .unwrap_or(86_400),
            reset_token_ttl_seconds: matches
                .get_one::<i64>("reset-token-ttl-seconds")
                .copied()
                .unwrap_or(3_600),
            default_avatar_url: string_arg(matches, "default-avatar-url"),
            image_store_url: matches.get_one::<String>("image-store-url").cloned(),
            admin_email: string_arg(matches, "admin-email"),
            admin_username: string_arg(matches, "admin-username"),
            admin_password: SecretString::from(admin_password),
        })
    }
}

fn string_arg(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}
