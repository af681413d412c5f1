/// Unified error types for tailwho
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
///
/// Lookup failures and policy rejections are not errors at this level: the
/// resolver reports them as `ResolutionOutcome::Unavailable` and
/// `ResolutionOutcome::Rejected`, and the request carries on without an
/// identity.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Template execution failure
    #[error("Render error: {0}")]
    Render(String),

    /// Listener or overlay session could not be started
    #[error("Bootstrap failed: {0}")]
    BootstrapFatal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<minijinja::Error> for ServiceError {
    fn from(err: minijinja::Error) -> Self {
        ServiceError::Render(err.to_string())
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert ServiceError to HTTP response
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ServiceError::Config(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            ServiceError::Render(_)
            | ServiceError::BootstrapFatal(_)
            | ServiceError::Internal(_)
            | ServiceError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
