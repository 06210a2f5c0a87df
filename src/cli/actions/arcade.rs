use super::{log_entries, start_sweeper};
use crate::{arcade, cli::commands::limits, games::GameLibrary, limiter::RateLimiter};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tracing::warn;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub games_dir: PathBuf,
    pub limits: limits::Options,
}

/// Execute the arcade action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("games_dir", args.games_dir.display().to_string()),
        (
            "rate_limit",
            format!("{}/min", args.limits.requests_per_minute),
        ),
        (
            "rate_limit_timeout",
            format!("{}s", args.limits.timeout.as_secs()),
        ),
        (
            "rate_limit_sweep",
            format!("{}s", args.limits.sweep_interval.as_secs()),
        ),
        (
            "trust_forwarded_for",
            args.limits.trust_forwarded_for.to_string(),
        ),
    ];
    log_entries("Arcade configuration", &entries);

    // Listings are read per request, so a missing root only fails the index page.
    if !tokio::fs::metadata(&args.games_dir)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
    {
        warn!("Games directory {} does not exist", args.games_dir.display());
    }

    let limiter = Arc::new(RateLimiter::new(args.limits.limiter_config()));
    start_sweeper(&limiter, args.limits.sweep_interval);

    arcade::new(
        args.port,
        Arc::new(GameLibrary::new(args.games_dir)),
        limiter,
    )
    .await
}
