//! # Passgate
//!
//! Two small HTTP services in one binary:
//!
//! - **gateway**: a passkey-gated login gateway. A passkey either matches the
//!   administrator passkey, one of the user passkeys kept in a flat CSV file, or
//!   nothing. Verified callers get a server-side session and are routed to the
//!   dashboard or the admin panel, where admins manage the user passkeys.
//! - **arcade**: a static server that lists and serves the game bundles found
//!   under a games directory.
//!
//! ## Rate Limiting
//!
//! Both services run every request through a per-IP sliding-window limiter
//! before any handler. A client that uses up its per-minute budget is blocked
//! for a fixed timeout and receives `429` JSON with `Retry-After`.
//!
//! ## Sessions
//!
//! Sessions are random tokens carried in an `HttpOnly` cookie and resolved by
//! the [`session::Session`] extractor. Handlers check the role explicitly
//! through the extractor instead of reading ambient state.
//!
//! ## Bundles
//!
//! Game paths are canonicalised and must stay inside their bundle directory;
//! anything else is a `404`.

pub mod arcade;
pub mod cli;
pub mod games;
pub mod gateway;
pub mod limiter;
pub mod passkeys;
pub mod server;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
