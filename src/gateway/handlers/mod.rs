//! Gateway route handlers.
//!
//! Page routes redirect when the session lacks the role they need. API routes
//! answer with JSON and never redirect.

pub mod pages;
pub mod passkeys;
pub mod verify;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON body carrying a passkey. A missing field reads as an empty passkey.
#[derive(Deserialize, ToSchema, Default)]
pub struct PasskeyRequest {
    #[serde(default)]
    pub passkey: String,
}

impl fmt::Debug for PasskeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasskeyRequest")
            .field("passkey", &"[REDACTED]")
            .finish()
    }
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passkey_request_defaults_and_redacts() -> anyhow::Result<()> {
        let request: PasskeyRequest = serde_json::from_str("{}")?;
        assert_eq!(request.passkey, "");

        let request: PasskeyRequest = serde_json::from_str(r#"{"passkey":"hunter2"}"#)?;
        assert_eq!(request.passkey, "hunter2");
        assert!(!format!("{request:?}").contains("hunter2"));
        Ok(())
    }
}
