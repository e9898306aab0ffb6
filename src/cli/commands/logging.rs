use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a count (0-5) or a level name from `VOCAWIK_LOG_LEVEL`.
fn parse_log_level(level: &str) -> std::result::Result<u8, String> {
    if let Ok(parsed) = level.parse::<u8>() {
        if parsed <= 5 {
            return Ok(parsed);
        }
    }

    LEVEL_NAMES
        .iter()
        .position(|name| level.eq_ignore_ascii_case(name))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level: {level}"))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("VOCAWIK_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

/// Tracing level for a verbosity count; `None` keeps the ERROR default.
#[must_use]
pub const fn level_from_verbosity(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn parse(matches: &ArgMatches) -> Option<Level> {
    level_from_verbosity(matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbosity_command() -> Command {
        with_args(Command::new("vocawik"))
    }

    #[test]
    fn level_names_and_counts_are_accepted() {
        for (input, expected) in [("0", 0u8), ("5", 5), ("WARN", 1), ("debug", 3), ("Trace", 4)] {
            assert_eq!(parse_log_level(input), Ok(expected), "input {input}");
        }
    }

    #[test]
    fn unknown_level_is_rejected() {
        for input in ["6", "verbose", ""] {
            assert!(parse_log_level(input).is_err(), "input {input}");
        }
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), None);
        assert_eq!(level_from_verbosity(1), Some(Level::WARN));
        assert_eq!(level_from_verbosity(2), Some(Level::INFO));
        assert_eq!(level_from_verbosity(3), Some(Level::DEBUG));
        assert_eq!(level_from_verbosity(9), Some(Level::TRACE));
    }

    #[test]
    fn repeated_flag_raises_level() {
        temp_env::with_var_unset("VOCAWIK_LOG_LEVEL", || {
            let matches = verbosity_command().get_matches_from(["vocawik", "-vv"]);
            assert_eq!(parse(&matches), Some(Level::INFO));

            let matches = verbosity_command().get_matches_from(["vocawik"]);
            assert_eq!(parse(&matches), None);
        });
    }
}
