use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;

pub type AppResult<T> = Result<T, AppError>;

/// Application error type
///
/// Every handler returns `AppResult`; the `IntoResponse` impl turns the error
/// into a JSON body with a stable `error_code` and never leaks internal
/// details for 5xx responses.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Database Errors =====
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database unavailable: {0}")]
    DbUnavailable(String),

    #[error("Database timeout: {0}")]
    DbTimeout(String),

    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Authentication & Authorization Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // ===== Request Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded: {message}")]
    TooManyRequests {
        message: String,
        retry_after_secs: u64,
    },

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Internal Server Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::DbUnavailable(_) | AppError::DbTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(msg) => format!("Authentication failed: {}", msg),
            AppError::Jwt(_) => "Invalid or expired token".to_string(),
            AppError::Forbidden(msg) => format!("Forbidden: {}", msg),
            AppError::Validation(msg) => format!("Validation error: {}", msg),
            AppError::Json(_) => "Malformed JSON body".to_string(),
            AppError::NotFound(msg) => format!("Not found: {}", msg),
            AppError::Conflict(msg) => format!("Conflict: {}", msg),
            AppError::TooManyRequests { message, .. } => message.clone(),
            AppError::DbUnavailable(_) => {
                "Service temporarily unavailable, please retry shortly".to_string()
            }
            AppError::DbTimeout(_) => "The request timed out, please retry".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Jwt(_) => "JWT_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TooManyRequests { .. } => "RATE_LIMITED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::DbUnavailable(_) => "DATABASE_UNAVAILABLE",
            AppError::DbTimeout(_) => "DATABASE_TIMEOUT",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        ) {
            tracing::warn!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Request rejected"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        // For server errors, don't expose internal details to client
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.user_message()
        };

        let body = json!({
            "error": message,
            "error_code": error_code,
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let AppError::TooManyRequests {
            retry_after_secs, ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::CircuitOpen { retry_in } => AppError::DbUnavailable(format!(
                "circuit breaker open, retry in {}s",
                retry_in.as_secs()
            )),
            DbError::Timeout { operation, timeout } => AppError::DbTimeout(format!(
                "{} exceeded {}ms",
                operation,
                timeout.as_millis()
            )),
            DbError::Query { source, .. } => {
                if crate::db::is_unique_violation(&source) {
                    AppError::Conflict("a record with the same unique value already exists".into())
                } else {
                    AppError::Database(source)
                }
            }
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    pub fn auth(msg: impl Into<String>) -> Self {
        AppError::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
