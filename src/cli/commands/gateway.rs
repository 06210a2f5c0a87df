use super::limits;
use crate::session::{SessionConfig, MAX_SESSION_TTL};
use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

pub const NAME: &str = "gateway";

pub const ARG_PORT: &str = "port";
pub const ARG_PASSKEYS_FILE: &str = "passkeys-file";
pub const ARG_ADMIN_PASSKEY: &str = "admin-passkey";
pub const ARG_PAGES_DIR: &str = "pages-dir";
pub const ARG_SESSION_TTL: &str = "session-ttl";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug)]
pub struct Options {
    pub port: u16,
    pub passkeys_file: PathBuf,
    pub admin_passkey: SecretString,
    pub pages_dir: PathBuf,
    pub session: SessionConfig,
}

impl Options {
    /// Parse gateway arguments from the `gateway` subcommand matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or the admin passkey is blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_path = |id: &str| -> Result<PathBuf> {
            matches
                .get_one::<PathBuf>(id)
                .cloned()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        let admin_passkey = matches
            .get_one::<String>(ARG_ADMIN_PASSKEY)
            .map(|passkey| passkey.trim().to_string())
            .filter(|passkey| !passkey.is_empty())
            .with_context(|| format!("missing required argument: --{ARG_ADMIN_PASSKEY}"))?;

        let session_ttl = matches
            .get_one::<u64>(ARG_SESSION_TTL)
            .copied()
            .with_context(|| format!("missing required argument: --{ARG_SESSION_TTL}"))?;

        Ok(Self {
            port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000),
            passkeys_file: read_path(ARG_PASSKEYS_FILE)?,
            admin_passkey: SecretString::from(admin_passkey),
            pages_dir: read_path(ARG_PAGES_DIR)?,
            session: SessionConfig::default()
                .with_ttl(Duration::from_secs(session_ttl))
                .with_cookie_secure(matches.get_flag(ARG_COOKIE_SECURE)),
        })
    }
}

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Serve the passkey-gated login gateway")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("3000")
                .env("PASSGATE_GATEWAY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_PASSKEYS_FILE)
                .long(ARG_PASSKEYS_FILE)
                .help("CSV file holding the user passkeys, seeded with defaults when missing")
                .default_value("passkeys.csv")
                .env("PASSGATE_PASSKEYS_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSKEY)
                .long(ARG_ADMIN_PASSKEY)
                .help("Administrator passkey, never stored in the passkeys file")
                .default_value("admin123")
                .hide_default_value(true)
                .env("PASSGATE_ADMIN_PASSKEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_PAGES_DIR)
                .long(ARG_PAGES_DIR)
                .help("Directory with login.html, index.html and admin.html")
                .default_value(".")
                .env("PASSGATE_PAGES_DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session lifetime in seconds")
                .default_value("43200")
                .env("PASSGATE_SESSION_TTL")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SESSION_TTL.as_secs())),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("PASSGATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(limits::rate_limit_arg("PASSGATE_GATEWAY_RATE_LIMIT", "7"))
}
