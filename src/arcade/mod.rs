//! Static server for the game bundles under the games root.

pub mod handlers;

use crate::{
    games::GameLibrary,
    limiter::RateLimiter,
    server::{health, serve, with_layers},
};
use anyhow::Result;
use axum::{extract::Extension, routing::get, Router};
use std::sync::Arc;

#[must_use]
pub fn router(library: Arc<GameLibrary>) -> Router {
    Router::new()
        .route("/", get(handlers::listing))
        .route("/health", get(health::health).options(health::health))
        .route("/:game", get(handlers::bundle_redirect))
        .route("/:game/", get(handlers::page))
        .route("/:game/*path", get(handlers::asset))
        .layer(Extension(library))
}

/// Start the arcade
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, library: Arc<GameLibrary>, limiter: Arc<RateLimiter>) -> Result<()> {
    let app = with_layers(router(library), limiter);

    serve(app, port).await
}
