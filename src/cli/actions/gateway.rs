use super::{log_entries, start_sweeper};
use crate::{
    cli::commands::limits,
    gateway::{self, Pages},
    limiter::RateLimiter,
    passkeys::PasskeyStore,
    session::{SessionConfig, SessionStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub passkeys_file: PathBuf,
    pub admin_passkey: SecretString,
    pub pages_dir: PathBuf,
    pub session: SessionConfig,
    pub limits: limits::Options,
}

/// Execute the gateway action.
/// # Errors
/// Returns an error if the passkeys file cannot be loaded or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = PasskeyStore::load(&args.passkeys_file, args.admin_passkey)
        .await
        .with_context(|| {
            format!(
                "Failed to load passkeys from {}",
                args.passkeys_file.display()
            )
        })?;
    info!(
        "Loaded {} user passkeys from {}",
        store.list().await.len(),
        store.path().display()
    );

    // Pages are served per request, so a missing file only fails its route.
    let pages = Pages::new(args.pages_dir);
    for page in pages.missing().await {
        warn!(
            "Page {} not found in {}",
            page.strip_prefix(pages.dir()).unwrap_or(&page).display(),
            pages.dir().display()
        );
    }

    let sessions = Arc::new(SessionStore::new(args.session));
    let limiter = Arc::new(RateLimiter::new(args.limits.limiter_config()));
    start_sweeper(&limiter, args.limits.sweep_interval);

    gateway::new(
        args.port,
        Arc::new(store),
        sessions,
        Arc::new(pages),
        limiter,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("passkeys_file", args.passkeys_file.display().to_string()),
        ("admin_passkey", "REDACTED".to_string()),
        ("pages_dir", args.pages_dir.display().to_string()),
        ("session_ttl", format!("{}s", args.session.ttl().as_secs())),
        ("cookie_secure", args.session.cookie_secure().to_string()),
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
    log_entries("Gateway configuration", &entries);
}
