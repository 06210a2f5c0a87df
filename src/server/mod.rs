//! HTTP plumbing shared by the gateway and the arcade.

pub mod health;

use crate::limiter::{self, RateLimiter};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    request_id::PropagateRequestIdLayer, services::ServeFile, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

const REQUEST_ID: &str = "x-request-id";

/// Wrap a service router with the rate limiter, request ids and tracing.
///
/// The limiter runs before any handler; request ids and the trace span wrap
/// the limiter so rejected requests are traced too.
#[must_use]
pub fn with_layers(router: Router, limiter: Arc<RateLimiter>) -> Router {
    router
        .layer(middleware::from_fn_with_state(limiter, limiter::enforce))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Bind `port` on all interfaces and serve until SIGINT/SIGTERM.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(router: Router, port: u16) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Stream a file from disk, letting `ServeFile` pick the content type.
pub async fn serve_file(path: impl AsRef<Path>, request: Request<Body>) -> Response {
    let result: Result<_, Infallible> = ServeFile::new(path).oneshot(request).await;
    match result {
        Ok(response) => response.map(Body::new).into_response(),
        Err(never) => match never {},
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitConfig;
    use anyhow::Result;
    use axum::{
        body::to_bytes,
        http::{header::CONTENT_TYPE, StatusCode},
        routing::get,
    };
    use tempfile::TempDir;

    #[tokio::test]
    async fn layers_add_request_id_to_responses() -> Result<()> {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(1)));
        let app = with_layers(Router::new().route("/", get(|| async { "ok" })), limiter);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let generated = response
            .headers()
            .get(REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        assert!(generated.is_some_and(|id| Ulid::from_string(&id).is_ok()));

        // rejected requests keep the caller's request id
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(REQUEST_ID, "caller-id")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(REQUEST_ID),
            Some(&HeaderValue::from_static("caller-id"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn serve_file_streams_with_content_type() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<p>hi</p>")?;

        let response = serve_file(&path, Request::builder().uri("/").body(Body::empty())?).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/html"))
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"<p>hi</p>");

        let missing = serve_file(
            dir.path().join("nope.html"),
            Request::builder().uri("/").body(Body::empty())?,
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
