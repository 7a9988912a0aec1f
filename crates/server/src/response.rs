//! Client-facing response envelope and error mapping.
//!
//! Every reply carries `{ data, error, code }` with
//! `code ∈ {successful, bad_request, internal_issue}`. Validation failures
//! answer 400, missing entities 404, disabled features 403, dispatch and
//! topology failures 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shardgate_core::errors::ProcessError;

/// Return code of a successful reply.
pub const CODE_SUCCESSFUL: &str = "successful";
/// Return code of a client-fault reply.
pub const CODE_BAD_REQUEST: &str = "bad_request";
/// Return code of a server-side failure.
pub const CODE_INTERNAL_ISSUE: &str = "internal_issue";

/// The proxy-level reply envelope.
#[derive(Debug, Serialize)]
pub struct GatewayResponse {
    pub data: serde_json::Value,
    pub error: String,
    pub code: &'static str,
}

impl GatewayResponse {
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self { data, error: String::new(), code: CODE_SUCCESSFUL }
    }
}

/// Converts a processing error into the envelope plus its HTTP status.
#[must_use]
pub fn error_response(error: &ProcessError) -> (StatusCode, GatewayResponse) {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = if status.is_client_error() { CODE_BAD_REQUEST } else { CODE_INTERNAL_ISSUE };

    (status, GatewayResponse { data: serde_json::Value::Null, error: error.to_string(), code })
}

/// Handler result type: processors either produce a data payload or a
/// [`ProcessError`] that maps onto the envelope.
pub struct GatewayResult(pub Result<serde_json::Value, ProcessError>);

impl IntoResponse for GatewayResult {
    fn into_response(self) -> Response {
        match self.0 {
            Ok(data) => (StatusCode::OK, Json(GatewayResponse::success(data))).into_response(),
            Err(e) => {
                let (status, body) = error_response(&e);
                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<Result<serde_json::Value, ProcessError>> for GatewayResult {
    fn from(result: Result<serde_json::Value, ProcessError>) -> Self {
        Self(result)
    }
}
