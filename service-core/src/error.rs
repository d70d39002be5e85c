use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Security-policy violations surfaced to callers.
///
/// Messages are deliberately non-specific about why a check failed so the
/// API cannot be used as an oracle; lockout carries remaining time so UIs
/// can render a countdown.
#[derive(Debug, Error)]
pub enum SecurityViolation {
    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Account temporarily locked. Try again in {remaining_minutes} minutes")]
    AccountLocked { remaining_minutes: i64 },

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Recent verification required for this action")]
    ReverificationRequired,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    SecurityError(SecurityViolation),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Dependency error: {0}")]
    DependencyError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<SecurityViolation> for AppError {
    fn from(violation: SecurityViolation) -> Self {
        AppError::SecurityError(violation)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details, retry_after) = match self {
            AppError::ValidationError(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg, None, None)
            }
            AppError::SecurityError(violation) => {
                let retry = match &violation {
                    SecurityViolation::AccountLocked { remaining_minutes } => {
                        Some((*remaining_minutes).max(1) as u64 * 60)
                    }
                    _ => None,
                };
                let status = match &violation {
                    SecurityViolation::AccountLocked { .. } => StatusCode::LOCKED,
                    _ => StatusCode::UNAUTHORIZED,
                };
                (status, violation.to_string(), None, retry)
            }
            AppError::TooManyRequests(msg, retry) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, None, retry)
            }
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    None,
                    None,
                )
            }
            AppError::DependencyError(err) => {
                tracing::error!(error = %err, "Dependency failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream dependency unavailable".to_string(),
                    None,
                    None,
                )
            }
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                    None,
                )
            }
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_maps_to_423_with_retry_after() {
        let err = AppError::SecurityError(SecurityViolation::AccountLocked {
            remaining_minutes: 14,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER),
            Some(&axum::http::HeaderValue::from_static("840"))
        );
    }

    #[test]
    fn invalid_code_is_unauthorized_and_nonspecific() {
        let err = AppError::SecurityError(SecurityViolation::InvalidCode);
        assert_eq!(err.to_string(), "Invalid verification code");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = AppError::TooManyRequests("slow down".to_string(), Some(120));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER),
            Some(&axum::http::HeaderValue::from_static("120"))
        );
    }
}
