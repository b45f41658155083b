//! Application error handling.
//!
//! Every public operation surfaces one of the variants below; HTTP handlers
//! convert them into JSON error responses with a stable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub correlation_id: String,
    pub timestamp: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    // Bad input: malformed dates, unknown period kinds, out-of-range settings
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    // Concurrent scrape, date already scraped, setup already completed
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Invalid or expired token")]
    Unauthorized,

    // Admin account lockout after repeated failed logins
    #[error("Account temporarily locked")]
    Locked { minutes_remaining: i64 },

    #[error("Rate limited by upstream")]
    RateLimited { retry_after_seconds: Option<u64> },

    // Browser/navigation failures, no platform match above threshold
    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    #[error("Database query failed")]
    Database(#[from] sqlx::Error),

    #[error("Internal error")]
    Internal { message: Option<String> },
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Locked { .. } => StatusCode::LOCKED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidInput { .. } => "INVALID_INPUT",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Locked { .. } => "ACCOUNT_LOCKED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidInput { message } => message.clone(),
            AppError::Conflict { message } => message.clone(),
            AppError::NotFound { resource } => format!("{} not found", resource),
            AppError::Unauthorized => "Invalid or expired token".to_string(),
            AppError::Locked { minutes_remaining } => format!(
                "Too many failed attempts. Account locked for {} more minute(s)",
                minutes_remaining
            ),
            AppError::RateLimited { .. } => {
                "Too many requests, please try again later".to_string()
            }
            AppError::Upstream { service, .. } => {
                format!("Error communicating with {}", service)
            }
            _ => "An unexpected error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();

        match &self {
            AppError::Database(_) | AppError::Internal { .. } => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Server error occurred"
                );
            }
            AppError::Upstream { service, .. } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    service = %service,
                    error = %self,
                    "Upstream error"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Client error occurred"
                );
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: self.user_message(),
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal {
            message: Some(format!("Password hashing error: {}", err)),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Unauthorized,
            jsonwebtoken::errors::ErrorKind::InvalidToken => AppError::Unauthorized,
            _ => AppError::Internal {
                message: Some(format!("JWT error: {}", err)),
            },
        }
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::InvalidInput {
            message: format!("Invalid date: {}", err),
        }
    }
}

/// Result type alias for application errors
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AppError::invalid_input("bad date").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::conflict("scrape running").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::not_found("Playlist").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Locked {
                minutes_remaining: 15
            }
            .status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            AppError::upstream("youtube", "no match").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn lock_message_names_remaining_minutes() {
        let err = AppError::Locked {
            minutes_remaining: 7,
        };
        assert!(err.user_message().contains("7"));
    }
}
