use crate::{
    gateway::Pages,
    server::serve_file,
    session::{clear_session_cookie, Session, SessionStore},
};
use axum::{
    extract::{Extension, Request},
    http::header::SET_COOKIE,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

/// `/` and `/login`: send signed-in users home, everyone else to the login page.
pub async fn index(
    session: Session,
    Extension(pages): Extension<Arc<Pages>>,
    request: Request,
) -> Response {
    if let Some(home) = session.home() {
        return Redirect::to(home).into_response();
    }
    serve_file(pages.login(), request).await
}

pub async fn dashboard(
    session: Session,
    Extension(pages): Extension<Arc<Pages>>,
    request: Request,
) -> Response {
    if session.require_authenticated().is_err() {
        return Redirect::to("/").into_response();
    }
    serve_file(pages.dashboard(), request).await
}

pub async fn admin(
    session: Session,
    Extension(pages): Extension<Arc<Pages>>,
    request: Request,
) -> Response {
    if session.require_admin().is_err() {
        debug!("Admin page denied for role {}", session.role().as_str());
        return Redirect::to("/").into_response();
    }
    serve_file(pages.admin(), request).await
}

pub async fn logout(session: Session, Extension(sessions): Extension<Arc<SessionStore>>) -> Response {
    if let Some(token) = session.token() {
        sessions.destroy(token);
    }

    let mut response = Redirect::to("/").into_response();
    match clear_session_cookie(sessions.config()) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build logout cookie: {err}"),
    }
    response
}
