//! HTTP surface: the public frontend-facing API (§6.1) and the internal
//! worker-facing API (§6.2).

pub mod auth;
pub mod internal;
pub mod public;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tessera_protocol::error::{ErrorDetail, TesseraError};

/// Wraps `TesseraError` so it can be returned directly from an axum
/// handler and renders as the published `ErrorDetail` body with the
/// matching HTTP status (§7).
pub struct ApiError(pub TesseraError);

impl From<TesseraError> for ApiError {
    fn from(err: TesseraError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = ErrorDetail::new(self.0.code(), self.0.to_string());
        (status, Json(detail)).into_response()
    }
}
