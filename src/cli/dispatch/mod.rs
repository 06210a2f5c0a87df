//! Map validated CLI matches to the action for the chosen service.

use crate::cli::{
    actions::{arcade, gateway, Action},
    commands::{self, limits},
};
use anyhow::{anyhow, Result};

/// Build the action for the selected subcommand.
///
/// # Errors
/// Returns an error if required arguments are missing or no subcommand was given.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::gateway::NAME, sub_m)) => {
            let options = commands::gateway::Options::parse(sub_m)?;
            Ok(Action::Gateway(gateway::Args {
                port: options.port,
                passkeys_file: options.passkeys_file,
                admin_passkey: options.admin_passkey,
                pages_dir: options.pages_dir,
                session: options.session,
                limits: limits::Options::parse(sub_m)?,
            }))
        }
        Some((commands::arcade::NAME, sub_m)) => {
            let options = commands::arcade::Options::parse(sub_m)?;
            Ok(Action::Arcade(arcade::Args {
                port: options.port,
                games_dir: options.games_dir,
                limits: limits::Options::parse(sub_m)?,
            }))
        }
        _ => Err(anyhow!("missing subcommand: gateway or arcade")),
    }
}
