use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    // Backend errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Backend operation timed out after {0} ms")]
    BackendTimeout(u64),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // Rate limiting
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures of the store backend (connectivity, timeouts).
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            AppError::Redis(_) | AppError::BackendTimeout(_) | AppError::BackendUnavailable(_)
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

// Implement IntoResponse for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::RateLimited {
                message,
                retry_after_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": message })),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            err @ (AppError::Redis(_)
            | AppError::BackendTimeout(_)
            | AppError::BackendUnavailable(_)) => {
                tracing::error!("Backend error: {:?}", err);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            err @ AppError::Configuration(_) => {
                tracing::error!("Configuration error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            err @ AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;
