use crate::cli::{
    actions::{arcade, gateway, Action},
    telemetry,
};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Gateway(args) => gateway::execute(args).await,
        Action::Arcade(args) => arcade::execute(args).await,
    };

    telemetry::shutdown_tracer();

    result
}
