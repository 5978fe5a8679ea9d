pub mod auth;
pub mod email;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("custodia")
        .about("Identity and authentication service")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODIA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("CUSTODIA_DSN")
                .required(true),
        );

    let command = auth::with_args(command);
    let command = email::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_env() -> Vec<(&'static str, Option<&'static str>)> {
        vec![
            (
                "CUSTODIA_DSN",
                Some("postgres://localhost:5432/custodia_test"),
            ),
            ("CUSTODIA_JWT_SECRET", Some("test-secret")),
            ("CUSTODIA_ADMIN_PASSWORD", Some("test-admin-password")),
            ("CUSTODIA_PORT", None),
            ("CUSTODIA_LOG_LEVEL", None),
        ]
    }

    #[test]
    fn command_parses_with_required_env() {
        temp_env::with_vars(required_env(), || {
            let matches = new()
                .try_get_matches_from(["custodia"])
                .expect("env-backed args should satisfy required flags");
            assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
            assert_eq!(
                matches.get_one::<String>("dsn").map(String::as_str),
                Some("postgres://localhost:5432/custodia_test")
            );
            assert_eq!(
                matches.get_one::<String>("jwt-expires-in").map(String::as_str),
                Some("30m")
            );
        });
    }

    #[test]
    fn command_requires_dsn() {
        temp_env::with_vars(
            [
                ("CUSTODIA_DSN", None::<&str>),
                ("CUSTODIA_JWT_SECRET", Some("test-secret")),
                ("CUSTODIA_ADMIN_PASSWORD", Some("test-admin-password")),
            ],
            || {
                assert!(new().try_get_matches_from(["custodia"]).is_err());
            },
        );
    }

    #[test]
    fn command_requires_jwt_secret() {
        temp_env::with_vars(
            [
                (
                    "CUSTODIA_DSN",
                    Some("postgres://localhost:5432/custodia_test"),
                ),
                ("CUSTODIA_JWT_SECRET", None::<&str>),
                ("CUSTODIA_ADMIN_PASSWORD", Some("test-admin-password")),
            ],
            || {
                assert!(new().try_get_matches_from(["custodia"]).is_err());
            },
        );
    }
}
