//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Domain validation errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => {
                let status = match domain_err {
                    DomainError::ExpenseNotFound(_) => StatusCode::NOT_FOUND,
                    DomainError::InvalidStatusTransition { .. }
                    | DomainError::BudgetCurrencyMismatch { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, domain_err.code(), Some(domain_err.to_string()))
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_status_mapping() {
        let not_found: AppError = DomainError::ExpenseNotFound("x".into()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let transition: AppError = DomainError::InvalidStatusTransition {
            from: "draft".into(),
            to: "closed".into(),
        }
        .into();
        assert_eq!(
            transition.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let amount: AppError = DomainError::AmountNotPositive("0".into()).into();
        assert_eq!(amount.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
