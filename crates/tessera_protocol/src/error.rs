//! Stable error taxonomy.
//!
//! Every failure the control plane can surface to a frontend, a worker, or
//! a webhook subscriber is one of these codes. The codes are part of the
//! public contract: additions are fine, renames are not.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error code, part of the public HTTP and webhook contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParams,
    InvalidPrompt,
    Unauthenticated,
    QuotaExceeded,
    NotFound,
    ModelNotFound,
    StateConflict,
    RateLimited,
    WorkerTimeout,
    WorkerError,
    Oom,
    Internal,
}

impl ErrorCode {
    /// HTTP status this code is reported under, per the published taxonomy.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidParams => 400,
            ErrorCode::InvalidPrompt => 400,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::QuotaExceeded => 402,
            ErrorCode::NotFound => 404,
            ErrorCode::ModelNotFound => 404,
            ErrorCode::StateConflict => 409,
            ErrorCode::RateLimited => 429,
            ErrorCode::WorkerTimeout => 500,
            ErrorCode::WorkerError => 500,
            ErrorCode::Oom => 500,
            ErrorCode::Internal => 500,
        }
    }

    /// Whether a job that failed with this code is eligible for an
    /// automatic retry (subject to the job's remaining retry budget).
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::WorkerTimeout | ErrorCode::WorkerError)
    }
}

/// Structured error attached to a terminal job record or returned from the
/// HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_available: Option<bool>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_available: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_retry_available(mut self, retry_available: bool) -> Self {
        self.retry_available = Some(retry_available);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Top-level error type returned by the admission service and other
/// synchronous control-plane operations.
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            TesseraError::InvalidParams(_) => ErrorCode::InvalidParams,
            TesseraError::InvalidPrompt(_) => ErrorCode::InvalidPrompt,
            TesseraError::Unauthenticated => ErrorCode::Unauthenticated,
            TesseraError::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            TesseraError::NotFound(_) => ErrorCode::NotFound,
            TesseraError::ModelNotFound(_) => ErrorCode::ModelNotFound,
            TesseraError::StateConflict(_) => ErrorCode::StateConflict,
            TesseraError::RateLimited { .. } => ErrorCode::RateLimited,
            TesseraError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub const fn http_status(&self) -> u16 {
        self.code().http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_match_the_published_taxonomy() {
        assert_eq!(ErrorCode::InvalidParams.http_status(), 400);
        assert_eq!(ErrorCode::QuotaExceeded.http_status(), 402);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::StateConflict.http_status(), 409);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::WorkerError.http_status(), 500);
    }

    #[test]
    fn only_timeout_and_worker_error_are_retryable() {
        assert!(ErrorCode::WorkerTimeout.is_retryable());
        assert!(ErrorCode::WorkerError.is_retryable());
        assert!(!ErrorCode::Oom.is_retryable());
        assert!(!ErrorCode::InvalidParams.is_retryable());
    }

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ModelNotFound).unwrap();
        assert_eq!(json, "\"MODEL_NOT_FOUND\"");
    }
}
