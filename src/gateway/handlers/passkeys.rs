//! Admin-only passkey management.
//!
//! Every endpoint checks the admin gate first and answers 401 JSON otherwise.
//! Passkey values are never logged.

use super::{error_response, ErrorResponse, PasskeyRequest};
use crate::{
    passkeys::{PasskeyError, PasskeyStore},
    session::{AccessDenied, Session},
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PasskeyList {
    pub passkeys: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PasskeyUpdate {
    pub success: bool,
    pub passkeys: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/passkeys",
    responses(
        (status = 200, description = "User passkeys", body = PasskeyList),
        (status = 401, description = "Not an admin session", body = ErrorResponse),
        (status = 429, description = "Rate limited"),
    ),
    tag = "passkeys"
)]
pub async fn list(
    session: Session,
    Extension(store): Extension<Arc<PasskeyStore>>,
) -> Result<Json<PasskeyList>, AccessDenied> {
    session.require_admin()?;

    Ok(Json(PasskeyList {
        passkeys: store.list().await,
    }))
}

#[utoipa::path(
    post,
    path = "/api/passkeys",
    request_body = PasskeyRequest,
    responses(
        (status = 200, description = "Passkey added", body = PasskeyUpdate),
        (status = 400, description = "Empty, reserved or duplicate passkey", body = ErrorResponse),
        (status = 401, description = "Not an admin session", body = ErrorResponse),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Passkeys could not be written", body = ErrorResponse),
    ),
    tag = "passkeys"
)]
pub async fn add(
    session: Session,
    Extension(store): Extension<Arc<PasskeyStore>>,
    payload: Option<Json<PasskeyRequest>>,
) -> Response {
    if let Err(denied) = session.require_admin() {
        return denied.into_response();
    }

    let passkey = payload.map(|Json(request)| request.passkey).unwrap_or_default();

    match store.add(&passkey).await {
        Ok(passkeys) => {
            info!(total = passkeys.len(), "Passkey added");
            Json(PasskeyUpdate {
                success: true,
                passkeys,
            })
            .into_response()
        }
        Err(err) => passkey_error(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/passkeys/{passkey}",
    params(
        ("passkey" = String, Path, description = "Passkey to remove")
    ),
    responses(
        (status = 200, description = "Passkey removed", body = PasskeyUpdate),
        (status = 401, description = "Not an admin session", body = ErrorResponse),
        (status = 404, description = "Passkey not found", body = ErrorResponse),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Passkeys could not be written", body = ErrorResponse),
    ),
    tag = "passkeys"
)]
pub async fn delete(
    session: Session,
    Extension(store): Extension<Arc<PasskeyStore>>,
    Path(passkey): Path<String>,
) -> Response {
    if let Err(denied) = session.require_admin() {
        return denied.into_response();
    }

    match store.remove(&passkey).await {
        Ok(passkeys) => {
            info!(total = passkeys.len(), "Passkey removed");
            Json(PasskeyUpdate {
                success: true,
                passkeys,
            })
            .into_response()
        }
        Err(err) => passkey_error(&err),
    }
}

fn passkey_error(err: &PasskeyError) -> Response {
    let status = match err {
        PasskeyError::Empty | PasskeyError::ReservedAdmin | PasskeyError::AlreadyExists => {
            StatusCode::BAD_REQUEST
        }
        PasskeyError::NotFound => StatusCode::NOT_FOUND,
        PasskeyError::Storage(source) => {
            error!("Failed to persist passkeys: {source}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn errors_map_to_statuses() {
        for (err, status) in [
            (PasskeyError::Empty, StatusCode::BAD_REQUEST),
            (PasskeyError::ReservedAdmin, StatusCode::BAD_REQUEST),
            (PasskeyError::AlreadyExists, StatusCode::BAD_REQUEST),
            (PasskeyError::NotFound, StatusCode::NOT_FOUND),
            (
                PasskeyError::Storage(io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ] {
            assert_eq!(passkey_error(&err).status(), status);
        }
    }
}
