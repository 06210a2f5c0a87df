use super::PasskeyRequest;
use crate::{
    passkeys::PasskeyStore,
    session::{landing_page, session_cookie, Session, SessionStore},
};
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/verify",
    request_body = PasskeyRequest,
    responses(
        (status = 200, description = "Passkey accepted, session cookie set", body = VerifyResponse),
        (status = 401, description = "Invalid passkey", body = VerifyResponse),
        (status = 429, description = "Rate limited"),
    ),
    tag = "gateway"
)]
/// Check a passkey and bind the resulting role to a fresh session.
pub async fn verify(
    session: Session,
    Extension(passkeys): Extension<Arc<PasskeyStore>>,
    Extension(sessions): Extension<Arc<SessionStore>>,
    payload: Option<Json<PasskeyRequest>>,
) -> Response {
    let passkey = payload.map(|Json(request)| request.passkey).unwrap_or_default();
    let role = passkeys.verify(&passkey).await;

    let Some(redirect) = landing_page(role) else {
        warn!("Rejected invalid passkey");
        return (
            StatusCode::UNAUTHORIZED,
            Json(VerifyResponse {
                success: false,
                redirect: None,
                message: Some("Invalid passkey".to_string()),
            }),
        )
            .into_response();
    };

    let token = match sessions.establish(session.token(), role) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to establish session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cookie = match session_cookie(sessions.config(), &token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(role = role.as_str(), "Passkey verified");

    (
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(VerifyResponse {
            success: true,
            redirect: Some(redirect.to_string()),
            message: None,
        }),
    )
        .into_response()
}
