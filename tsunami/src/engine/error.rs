//! Crate-wide error type.
//!
//! Errors are split along the lines spec'd for the engine: protocol errors
//! (surface as an HTTP status at the transport boundary), state errors
//! (atom registration/adaptation), and resource errors (channel/backpressure
//! conditions that are usually just logged, never returned).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("client id mismatch")]
    ClientIdMismatch,

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("atom '{0}' is already registered")]
    DuplicateAtom(String),

    #[error("atom '{0}' not found")]
    UnknownAtom(String),

    #[error("value for atom '{name}' could not be adapted to its declared type: {reason}")]
    AtomAdaptation { name: String, reason: String },

    #[error("modal '{0}' not found")]
    UnknownModal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::ClientIdMismatch => StatusCode::BAD_REQUEST,
            EngineError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            EngineError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            EngineError::DuplicateAtom(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::UnknownAtom(_) => StatusCode::BAD_REQUEST,
            EngineError::AtomAdaptation { .. } => StatusCode::BAD_REQUEST,
            EngineError::UnknownModal(_) => StatusCode::NOT_FOUND,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
