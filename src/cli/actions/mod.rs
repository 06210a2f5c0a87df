pub mod arcade;
pub mod gateway;

// Internal "interpreter" for `Action`.
mod run;

use crate::limiter::RateLimiter;
use std::{fmt::Write as _, sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub enum Action {
    Gateway(gateway::Args),
    Arcade(arcade::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}

/// Start the idle-entry sweep unless it is disabled with a zero interval.
fn start_sweeper(limiter: &Arc<RateLimiter>, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    // detached: runs until the runtime shuts down
    drop(limiter.start_sweeper(interval));
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ = write!(message, "\n  {key}:{padding} {value}");
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
