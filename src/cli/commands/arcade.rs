use super::limits;
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const NAME: &str = "arcade";

pub const ARG_PORT: &str = "port";
pub const ARG_GAMES_DIR: &str = "games-dir";

#[derive(Debug, Clone)]
pub struct Options {
    pub port: u16,
    pub games_dir: PathBuf,
}

impl Options {
    /// Parse arcade arguments from the `arcade` subcommand matches.
    ///
    /// # Errors
    /// Returns an error if the games directory is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8000),
            games_dir: matches
                .get_one::<PathBuf>(ARG_GAMES_DIR)
                .cloned()
                .with_context(|| format!("missing required argument: --{ARG_GAMES_DIR}"))?,
        })
    }
}

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Serve the game bundles")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8000")
                .env("PASSGATE_ARCADE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_GAMES_DIR)
                .long(ARG_GAMES_DIR)
                .help("Directory whose subdirectories are the game bundles")
                .default_value("games")
                .env("PASSGATE_GAMES_DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(limits::rate_limit_arg("PASSGATE_ARCADE_RATE_LIMIT", "30"))
}
