//! Entry point of the `passgate` binary.

use crate::cli::{
    actions::Action,
    commands::{self, logging},
    dispatch, telemetry,
};
use anyhow::Result;

/// Parse the command line, install logging and tracing, then build the
/// gateway or arcade action for the binary to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be installed or the subcommand
/// options are invalid.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or_default();
    telemetry::init(logging::level_for(verbosity))?;

    dispatch::handler(&matches)
}
