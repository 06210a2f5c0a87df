use crate::{
    games::{GameLibrary, ResolveError},
    server::serve_file,
};
use axum::{
    extract::{Extension, Path, Request},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::{fmt::Write as _, path::PathBuf, sync::Arc};
use tracing::error;

/// Index page listing every bundle in the games root.
pub async fn listing(Extension(library): Extension<Arc<GameLibrary>>) -> Response {
    match library.list_bundles().await {
        Ok(bundles) => Html(render_listing(&bundles)).into_response(),
        Err(err) => {
            error!(
                "Failed to list games in {}: {err}",
                library.root().display()
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// `/<game>` has no trailing slash, so relative asset URLs would resolve
/// against the root. Send the browser to `/<game>/` instead.
pub async fn bundle_redirect(uri: Uri) -> Redirect {
    Redirect::permanent(&format!("{}/", uri.path()))
}

pub async fn page(
    Extension(library): Extension<Arc<GameLibrary>>,
    Path(game): Path<String>,
    request: Request,
) -> Response {
    respond(library.resolve_page(&game).await, request).await
}

pub async fn asset(
    Extension(library): Extension<Arc<GameLibrary>>,
    Path((game, path)): Path<(String, String)>,
    request: Request,
) -> Response {
    respond(library.resolve_asset(&game, &path).await, request).await
}

async fn respond(resolved: Result<PathBuf, ResolveError>, request: Request) -> Response {
    match resolved {
        Ok(path) => serve_file(path, request).await,
        Err(ResolveError::NotFound) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(ResolveError::Io(err)) => {
            error!("Failed to resolve {}: {err}", request.uri().path());
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn render_listing(bundles: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Games</title>\n</head>\n<body>\n<h1>Games</h1>\n",
    );

    if bundles.is_empty() {
        html.push_str("<p>No games found.</p>\n");
    } else {
        html.push_str("<ul>\n");
        for bundle in bundles {
            let _ = writeln!(
                html,
                "<li><a href=\"/{}/\">{}</a></li>",
                encode_segment(bundle),
                escape_html(bundle)
            );
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
