use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Misuse of a local API (e.g. deciding a relay request twice). Never hits the wire.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Stale message: {0}")]
    Stale(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::AlreadyInProgress(_) => "already_in_progress",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NotFound(_) => "not_found",
            AppError::Usage(_) => "usage",
            AppError::Rejected(_) => "rejected",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unreachable(_) => "unreachable",
            AppError::TransportFailure(_) => "transport_failure",
            AppError::Stale(_) => "stale_message",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Usage(_) => StatusCode::CONFLICT,
            AppError::Rejected(_) => StatusCode::FORBIDDEN,
            AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::Unreachable(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Stale(_) => StatusCode::GONE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.code(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
