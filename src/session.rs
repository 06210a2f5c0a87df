//! Server-side sessions and role gating for the gateway.
//!
//! Flow Overview:
//! 1) A successful passkey check stores a random token with its role and
//!    sends the token back in an `HttpOnly` cookie.
//! 2) Each request resolves the cookie through the [`Session`] extractor, which
//!    hands the handler an explicit capability instead of ambient state.
//! 3) Handlers call [`Session::require_authenticated`] or
//!    [`Session::require_admin`] before doing any work.
//!
//! Tokens are rotated on every successful verification and dropped on logout
//! or once the TTL has passed.

use crate::passkeys::Role;
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{InvalidHeaderValue, COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::error;

pub const SESSION_COOKIE_NAME: &str = "passgate_session";

/// Longest lifetime a session can be configured with.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    ttl: Duration,
    cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            cookie_secure: false,
        }
    }
}

impl SessionConfig {
    /// Session lifetime, capped at [`MAX_SESSION_TTL`].
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.min(MAX_SESSION_TTL);
        self
    }

    /// Only mark cookies secure when the gateway is served over HTTPS.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

#[derive(Debug)]
struct SessionEntry {
    role: Role,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session with `role`, discarding `previous` if it was set.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails or the expiry overflows.
    pub fn establish(&self, previous: Option<&str>, role: Role) -> Result<String> {
        let token = generate_session_token()?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(self.config.ttl)
            .context("session expiry out of range")?;

        let mut sessions = self.lock();
        sessions.retain(|_, entry| entry.expires_at > now);
        if let Some(previous) = previous {
            sessions.remove(previous);
        }
        sessions.insert(
            token.clone(),
            SessionEntry {
                role,
                expires_at,
            },
        );

        Ok(token)
    }

    /// Role bound to `token`, or `Anonymous` if unknown or expired.
    pub fn role(&self, token: &str) -> Role {
        let now = Instant::now();
        let mut sessions = self.lock();
        match sessions.get(token) {
            Some(entry) if entry.expires_at > now => entry.role,
            Some(_) => {
                sessions.remove(token);
                Role::Anonymous
            }
            None => Role::Anonymous,
        }
    }

    pub fn destroy(&self, token: &str) {
        self.lock().remove(token);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a new session token for the auth cookie.
fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Build the `HttpOnly` cookie that carries the session token.
///
/// # Errors
/// Returns an error if the token contains bytes not allowed in a header.
pub fn session_cookie(
    config: &SessionConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.ttl().as_secs();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the cookie that makes the browser forget the session.
///
/// # Errors
/// Returns an error if the cookie cannot be encoded as a header value.
pub fn clear_session_cookie(config: &SessionConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == SESSION_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unauthorized")]
pub struct AccessDenied;

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// The caller's session, resolved from the request cookie.
#[derive(Debug, Clone)]
pub struct Session {
    token: Option<String>,
    role: Role,
}

impl Session {
    #[must_use]
    pub fn new(token: Option<String>, role: Role) -> Self {
        Self { token, role }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Token presented by the client, if it still maps to a live session.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// # Errors
    /// Returns `AccessDenied` unless the session is `User` or `Admin`.
    pub fn require_authenticated(&self) -> Result<(), AccessDenied> {
        if self.role.is_authenticated() {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }

    /// # Errors
    /// Returns `AccessDenied` unless the session is `Admin`.
    pub fn require_admin(&self) -> Result<(), AccessDenied> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }

    /// Landing page for the session's role.
    #[must_use]
    pub fn home(&self) -> Option<&'static str> {
        landing_page(self.role)
    }
}

/// Landing page for an authenticated role.
#[must_use]
pub const fn landing_page(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => Some("/admin"),
        Role::User => Some("/dashboard"),
        Role::Anonymous => None,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(store) = parts.extensions.get::<Arc<SessionStore>>() else {
            error!("Session store extension is missing");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let Some(token) = extract_session_token(&parts.headers) else {
            return Ok(Self::new(None, Role::Anonymous));
        };

        match store.role(&token) {
            Role::Anonymous => Ok(Self::new(None, Role::Anonymous)),
            role => Ok(Self::new(Some(token), role)),
        }
    }
}
