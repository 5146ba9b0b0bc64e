use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest::IngestError;
use protocol::IngestResponse;

pub type ServerResult<T> = Result<T, ServerError>;

/// Failures raised by the HTTP layer itself.
///
/// Every variant renders the receiver's wire shape
/// (`{"success": false, "error": <code>}`) so senders parse one format.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Ingest rejected: {0}")]
    Ingest(#[from] IngestError),

    #[error("Body exceeds the listener limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Ingest(err) => {
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ServerError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Ingest(err) => err.code(),
            ServerError::BodyTooLarge { .. } => "payload_too_large",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Internal(_) => "internal_error",
            ServerError::Config(_) => "config_error",
            ServerError::NotFound => "not_found",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ServerError::Ingest(err) => err.to_response(),
            other => IngestResponse::rejected(other.error_code(), None),
        };
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request_failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("IO error: {err}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}
