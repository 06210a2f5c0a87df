//! Per-IP sliding window rate limiting shared by both services.
//!
//! Flow Overview:
//! 1) An IP inside a timeout is rejected outright; an expired timeout is cleared.
//! 2) The IP's request log is pruned to the trailing 60 second window.
//! 3) A full window rejects the request and starts a timeout, otherwise the
//!    request is recorded and admitted.
//!
//! State is process-local. Both maps sit behind a single mutex that is never
//! held across an `.await`.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Trailing window used to count recent requests.
pub const WINDOW: Duration = Duration::from_secs(60);

pub const LIMITED_MESSAGE: &str = "Too many requests. Please wait a minute.";

/// Longest timeout a client can be blocked for.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const UNKNOWN_IP: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    requests_per_minute: usize,
    timeout: Duration,
    trust_forwarded_for: bool,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            requests_per_minute,
            timeout: DEFAULT_TIMEOUT,
            trust_forwarded_for: false,
        }
    }

    /// Timeout applied once a client fills its window, capped at [`MAX_TIMEOUT`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    /// Key clients by the first `X-Forwarded-For` entry instead of the peer address.
    ///
    /// Only safe behind a reverse proxy that always overwrites the header.
    #[must_use]
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    #[must_use]
    pub fn requests_per_minute(&self) -> usize {
        self.requests_per_minute
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    requests: HashMap<String, Vec<Instant>>,
    timeouts: HashMap<String, Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decide whether a request from `ip` is admitted, recording it if so.
    pub fn admit(&self, ip: &str) -> RateLimitDecision {
        self.admit_at(ip, Instant::now())
    }

    /// Same as [`RateLimiter::admit`] with an explicit clock.
    pub fn admit_at(&self, ip: &str, now: Instant) -> RateLimitDecision {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(&until) = state.timeouts.get(ip) {
            if now < until {
                return RateLimitDecision::Limited {
                    retry_after: until - now,
                };
            }
            state.timeouts.remove(ip);
        }

        let log = state.requests.entry(ip.to_string()).or_default();
        prune(log, now);

        if log.len() >= self.config.requests_per_minute {
            // a full window keeps rejecting even if the expiry cannot be represented
            if let Some(until) = now.checked_add(self.config.timeout) {
                state.timeouts.insert(ip.to_string(), until);
            }
            return RateLimitDecision::Limited {
                retry_after: self.config.timeout,
            };
        }

        log.push(now);
        RateLimitDecision::Allowed
    }

    /// Drop IPs that have no requests inside the window and no active timeout.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.timeouts.retain(|_, until| now < *until);
        let timeouts = &state.timeouts;
        state.requests.retain(|ip, log| {
            prune(log, now);
            !log.is_empty() || timeouts.contains_key(ip)
        });
    }

    /// Number of IPs currently holding limiter state.
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        let state = self.lock();
        let mut count = state.requests.len();
        count += state
            .timeouts
            .keys()
            .filter(|ip| !state.requests.contains_key(*ip))
            .count();
        count
    }

    /// Spawn a task that sweeps idle entries every `interval`.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
                debug!("rate limiter sweep done, tracking {} ips", limiter.tracked_ips());
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Keep only entries strictly newer than `now - WINDOW`.
fn prune(log: &mut Vec<Instant>, now: Instant) {
    if let Some(cutoff) = now.checked_sub(WINDOW) {
        log.retain(|&t| t > cutoff);
    }
}

/// Resolve the key used to rate limit a request.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_IP.to_string(), |addr| addr.ip().to_string())
}

/// Middleware that runs the limiter before any handler.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let ip = client_ip(
        request.headers(),
        peer,
        limiter.config().trust_forwarded_for(),
    );

    match limiter.admit(&ip) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            warn!("Rate limited {ip} on {}", request.uri().path());
            limited_response(retry_after)
        }
    }
}

fn limited_response(retry_after: Duration) -> Response {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": LIMITED_MESSAGE })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(seconds));
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        extract::connect_info::MockConnectInfo,
        http::Request,
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn limiter(requests_per_minute: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(requests_per_minute))
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn admits_up_to_the_limit_then_times_out() {
        let limiter = limiter(7);
        let t0 = Instant::now();

        for i in 0..7 {
            let now = t0 + Duration::from_millis(i * 100);
            assert_eq!(limiter.admit_at("10.0.0.1", now), RateLimitDecision::Allowed);
        }

        assert_eq!(
            limiter.admit_at("10.0.0.1", t0 + secs(1)),
            RateLimitDecision::Limited {
                retry_after: secs(60)
            }
        );

        // still inside the timeout even though the window has moved on
        assert!(matches!(
            limiter.admit_at("10.0.0.1", t0 + secs(60)),
            RateLimitDecision::Limited { .. }
        ));

        assert_eq!(
            limiter.admit_at("10.0.0.1", t0 + secs(61)),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn requests_during_timeout_do_not_extend_it() {
        let limiter = limiter(1);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("ip", t0), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.admit_at("ip", t0 + secs(1)),
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(
            limiter.admit_at("ip", t0 + secs(31)),
            RateLimitDecision::Limited {
                retry_after: secs(30)
            }
        );
        assert_eq!(limiter.admit_at("ip", t0 + secs(61)), RateLimitDecision::Allowed);
    }

    #[test]
    fn evenly_spaced_requests_never_time_out() {
        let limiter = limiter(7);
        let t0 = Instant::now();

        // 9s spacing keeps at most 6 earlier entries inside any 60s window
        for i in 0..100 {
            assert_eq!(
                limiter.admit_at("10.0.0.2", t0 + secs(i * 9)),
                RateLimitDecision::Allowed,
                "request {i} was limited"
            );
        }
    }

    #[test]
    fn window_boundary_is_exclusive_at_the_old_end() {
        let limiter = limiter(2);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("ip", t0), RateLimitDecision::Allowed);
        assert_eq!(limiter.admit_at("ip", t0 + secs(1)), RateLimitDecision::Allowed);
        // the entry at t0 sits exactly on `now - 60s` and no longer counts
        assert_eq!(limiter.admit_at("ip", t0 + secs(60)), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.admit_at("ip", t0 + Duration::from_millis(60_500)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn ips_are_tracked_independently() {
        let limiter = limiter(2);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("a", t0), RateLimitDecision::Allowed);
        assert_eq!(limiter.admit_at("a", t0), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.admit_at("a", t0),
            RateLimitDecision::Limited { .. }
        ));

        assert_eq!(limiter.admit_at("b", t0), RateLimitDecision::Allowed);
        assert_eq!(limiter.admit_at("b", t0), RateLimitDecision::Allowed);
    }

    #[test]
    fn custom_timeout_is_honoured() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1).with_timeout(secs(5)));
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("ip", t0), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.admit_at("ip", t0),
            RateLimitDecision::Limited {
                retry_after: secs(5)
            }
        );
        // timeout is over but the first request is still in the window
        assert!(matches!(
            limiter.admit_at("ip", t0 + secs(5)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn oversized_timeout_is_capped() {
        let config = RateLimitConfig::new(1).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(config.timeout(), MAX_TIMEOUT);

        let limiter = RateLimiter::new(config);
        let t0 = Instant::now();
        assert_eq!(limiter.admit_at("ip", t0), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.admit_at("ip", t0),
            RateLimitDecision::Limited {
                retry_after: MAX_TIMEOUT
            }
        );
        assert!(matches!(
            limiter.admit_at("ip", t0 + secs(3600)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn sweep_drops_idle_ips_only() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1).with_timeout(secs(120)));
        let t0 = Instant::now();

        limiter.admit_at("idle", t0);
        limiter.admit_at("blocked", t0);
        limiter.admit_at("blocked", t0);
        limiter.admit_at("recent", t0 + secs(100));
        assert_eq!(limiter.tracked_ips(), 3);

        limiter.sweep_at(t0 + secs(105));
        // "blocked" has an empty window but its timeout runs until t0 + 120s
        assert_eq!(limiter.tracked_ips(), 2);

        limiter.sweep_at(t0 + secs(200));
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn client_ip_ignores_forwarded_header_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 10.0.0.1"));
        let peer: SocketAddr = "192.168.1.10:4242".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), false), "192.168.1.10");
        assert_eq!(client_ip(&headers, Some(peer), true), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_peer_or_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        let peer: SocketAddr = "[::1]:8080".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), true), "::1");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), UNKNOWN_IP);
    }

    #[tokio::test]
    async fn middleware_rejects_with_429_and_retry_after() -> Result<()> {
        let limiter = Arc::new(limiter(2));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, enforce))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/").body(Body::empty())?)
                .await?;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("60"))
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(value["error"], LIMITED_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn middleware_keys_clients_by_peer_address() -> Result<()> {
        let limiter = Arc::new(limiter(1));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter.clone(), enforce));
        let first = app
            .clone()
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));
        let second = app.layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 2], 4000))));

        let status = |router: Router| async move {
            let request = Request::builder().uri("/").body(Body::empty())?;
            Ok::<_, anyhow::Error>(router.oneshot(request).await?.status())
        };

        assert_eq!(status(first.clone()).await?, StatusCode::OK);
        assert_eq!(status(first).await?, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(second).await?, StatusCode::OK);
        assert_eq!(limiter.tracked_ips(), 2);
        Ok(())
    }
}
