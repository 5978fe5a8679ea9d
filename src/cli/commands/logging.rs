use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Accept either a numeric count (0-5) or a level name for the env fallback.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        match level.parse::<u8>() {
            Ok(parsed) if parsed <= 5 => Ok(parsed),
            _ => match level.to_lowercase().as_str() {
                "error" => Ok(0),
                "warn" => Ok(1),
                "info" => Ok(2),
                "debug" => Ok(3),
                "trace" => Ok(4),
                _ => Err("invalid log level".to_string()),
            },
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("CUSTODIA_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_command() -> Command {
        with_args(Command::new("test"))
    }

    #[test]
    fn verbosity_counts_flags() {
        let matches = test_command()
            .try_get_matches_from(["test", "-vvv"])
            .expect("flags should parse");
        assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
    }

    #[test]
    fn verbosity_defaults_to_zero() {
        let matches = test_command()
            .try_get_matches_from(["test"])
            .expect("no flags should parse");
        assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(0));
    }
}
