//! Passkey-gated login gateway.
//!
//! Serves the login, dashboard and admin pages from a pages directory and the
//! JSON API used by those pages to verify passkeys and manage the user list.

pub mod handlers;

use crate::{
    limiter::RateLimiter,
    passkeys::PasskeyStore,
    server::{
        health::{self, Health},
        serve, with_layers,
    },
    session::SessionStore,
};
use anyhow::Result;
use axum::{
    extract::Extension,
    routing::{delete, get, post},
    Router,
};
use handlers::{
    pages,
    passkeys::{self as manage, PasskeyList, PasskeyUpdate},
    verify::{self, VerifyResponse},
    ErrorResponse, PasskeyRequest,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use utoipa::OpenApi;

const LOGIN_PAGE: &str = "login.html";
const DASHBOARD_PAGE: &str = "index.html";
const ADMIN_PAGE: &str = "admin.html";

/// Directory holding the pre-built gateway pages.
#[derive(Debug, Clone)]
pub struct Pages {
    dir: PathBuf,
}

impl Pages {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn login(&self) -> PathBuf {
        self.dir.join(LOGIN_PAGE)
    }

    #[must_use]
    pub fn dashboard(&self) -> PathBuf {
        self.dir.join(DASHBOARD_PAGE)
    }

    #[must_use]
    pub fn admin(&self) -> PathBuf {
        self.dir.join(ADMIN_PAGE)
    }

    /// Pages that are not regular files under [`Pages::dir`].
    pub async fn missing(&self) -> Vec<PathBuf> {
        let mut missing = Vec::new();
        for page in [self.login(), self.dashboard(), self.admin()] {
            if !tokio::fs::metadata(&page)
                .await
                .is_ok_and(|metadata| metadata.is_file())
            {
                missing.push(page);
            }
        }
        missing
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        verify::verify,
        manage::list,
        manage::add,
        manage::delete,
    ),
    components(schemas(
        Health,
        PasskeyRequest,
        VerifyResponse,
        PasskeyList,
        PasskeyUpdate,
        ErrorResponse,
    )),
    tags(
        (name = "gateway", description = "Passkey verification"),
        (name = "passkeys", description = "Admin passkey management"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

/// `OpenAPI` document for the gateway's JSON endpoints.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Gateway routes with their shared state attached.
#[must_use]
pub fn router(store: Arc<PasskeyStore>, sessions: Arc<SessionStore>, pages: Arc<Pages>) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/login", get(pages::index))
        .route("/dashboard", get(pages::dashboard))
        .route("/admin", get(pages::admin))
        .route("/logout", get(pages::logout))
        .route("/api/verify", post(verify::verify))
        .route("/api/passkeys", get(manage::list).post(manage::add))
        .route("/api/passkeys/:passkey", delete(manage::delete))
        .route("/health", get(health::health).options(health::health))
        .layer(Extension(store))
        .layer(Extension(sessions))
        .layer(Extension(pages))
}

/// Start the gateway
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    store: Arc<PasskeyStore>,
    sessions: Arc<SessionStore>,
    pages: Arc<Pages>,
    limiter: Arc<RateLimiter>,
) -> Result<()> {
    let app = with_layers(router(store, sessions, pages), limiter);

    serve(app, port).await
}
