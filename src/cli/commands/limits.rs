use crate::limiter::{RateLimitConfig, MAX_TIMEOUT};
use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_RATE_LIMIT: &str = "rate-limit";
pub const ARG_RATE_LIMIT_TIMEOUT: &str = "rate-limit-timeout";
pub const ARG_RATE_LIMIT_SWEEP: &str = "rate-limit-sweep";
pub const ARG_TRUST_FORWARDED_FOR: &str = "trust-forwarded-for";

#[derive(Debug, Clone)]
pub struct Options {
    pub requests_per_minute: usize,
    pub timeout: Duration,
    pub sweep_interval: Duration,
    pub trust_forwarded_for: bool,
}

impl Options {
    /// Parse rate limiter arguments from subcommand matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_seconds = |id: &str| -> Result<Duration> {
            matches
                .get_one::<u64>(id)
                .copied()
                .map(Duration::from_secs)
                .with_context(|| format!("missing required argument: --{id}"))
        };

        let requests_per_minute = matches
            .get_one::<u64>(ARG_RATE_LIMIT)
            .copied()
            .with_context(|| format!("missing required argument: --{ARG_RATE_LIMIT}"))?;

        Ok(Self {
            requests_per_minute: usize::try_from(requests_per_minute)
                .with_context(|| format!("--{ARG_RATE_LIMIT} is too large"))?,
            timeout: read_seconds(ARG_RATE_LIMIT_TIMEOUT)?,
            sweep_interval: read_seconds(ARG_RATE_LIMIT_SWEEP)?,
            trust_forwarded_for: matches.get_flag(ARG_TRUST_FORWARDED_FOR),
        })
    }

    #[must_use]
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.requests_per_minute)
            .with_timeout(self.timeout)
            .with_trust_forwarded_for(self.trust_forwarded_for)
    }
}

/// Per-service request budget; each subcommand has its own env var and default.
#[must_use]
pub fn rate_limit_arg(env: &'static str, default: &'static str) -> Arg {
    Arg::new(ARG_RATE_LIMIT)
        .long(ARG_RATE_LIMIT)
        .help("Requests per minute allowed for each client IP")
        .env(env)
        .default_value(default)
        .value_parser(clap::value_parser!(u64).range(1..))
}

/// Limiter settings shared by every service.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_TIMEOUT)
                .long(ARG_RATE_LIMIT_TIMEOUT)
                .help("Seconds a client stays blocked after exceeding the rate limit")
                .env("PASSGATE_RATE_LIMIT_TIMEOUT")
                .default_value("60")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(..=MAX_TIMEOUT.as_secs())),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_SWEEP)
                .long(ARG_RATE_LIMIT_SWEEP)
                .help("Seconds between sweeps of idle rate limiter entries, 0 disables the sweep")
                .env("PASSGATE_RATE_LIMIT_SWEEP")
                .default_value("300")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TRUST_FORWARDED_FOR)
                .long(ARG_TRUST_FORWARDED_FOR)
                .help("Use the first X-Forwarded-For address as the client IP (only behind a trusted proxy)")
                .env("PASSGATE_TRUST_FORWARDED_FOR")
                .global(true)
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
