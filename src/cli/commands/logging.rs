//! `-v` / `PASSGATE_LOG_LEVEL`, shared by the gateway and the arcade.
//!
//! Each `-v` raises the log level one step from ERROR. The env var takes the
//! step number or the level name.

use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Log levels in `-v` order, indexed by verbosity count.
pub const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Level for a verbosity count; extra `-v` flags stay at TRACE.
#[must_use]
pub fn level_for(verbosity: u8) -> Level {
    LEVELS
        .get(usize::from(verbosity))
        .copied()
        .unwrap_or(Level::TRACE)
}

fn parse_level(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let index = match value.parse::<usize>() {
        Ok(index) => Some(index).filter(|index| *index < LEVELS.len()),
        Err(_) => LEVELS
            .iter()
            .position(|level| level.as_str().eq_ignore_ascii_case(value)),
    };

    index
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!("invalid log level `{value}`, expected 0-4 or error, warn, info, debug, trace")
        })
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE (default: ERROR)")
            .env("PASSGATE_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), Level::ERROR);
        assert_eq!(level_for(1), Level::WARN);
        assert_eq!(level_for(2), Level::INFO);
        assert_eq!(level_for(3), Level::DEBUG);
        assert_eq!(level_for(4), Level::TRACE);
        assert_eq!(level_for(9), Level::TRACE);
    }

    #[test]
    fn levels_parse_by_number_or_name() {
        assert_eq!(parse_level("0"), Ok(0));
        assert_eq!(parse_level("4"), Ok(4));
        assert_eq!(parse_level("warn"), Ok(1));
        assert_eq!(parse_level(" DEBUG "), Ok(3));
        assert!(parse_level("5").is_err());
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn env_levels_out_of_range_are_rejected() {
        temp_env::with_vars([("PASSGATE_LOG_LEVEL", Some("9"))], || {
            let command = with_args(Command::new("test"));
            assert!(command.try_get_matches_from(["test"]).is_err());
        });

        temp_env::with_vars([("PASSGATE_LOG_LEVEL", Some("trace"))], || {
            let command = with_args(Command::new("test"));
            let matches = command.try_get_matches_from(["test"]);
            assert_eq!(
                matches.ok().and_then(|m| m.get_one::<u8>(ARG_VERBOSITY).copied()),
                Some(4)
            );
        });
    }
}
