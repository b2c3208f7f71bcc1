//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<crate::ledger::LedgerError> for AppError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        use crate::ledger::LedgerError;
        match err {
            LedgerError::Domain(e) => AppError::Domain(e),
            LedgerError::Database(e) => AppError::Database(e),
            LedgerError::AccountNotFound(id) => AppError::AccountNotFound(id.to_string()),
            LedgerError::EntryNotFound(id) => {
                AppError::InvalidRequest(format!("Ledger entry {} not found", id))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
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
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // 403 Forbidden
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // 404 Not Found
            AppError::AccountNotFound(id) => {
                (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
            }
            AppError::TransferNotFound(id) => {
                (StatusCode::NOT_FOUND, "transfer_not_found", Some(id.clone()))
            }

            // 400 Missing Header
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::Validation { .. } => {
                        (StatusCode::BAD_REQUEST, "validation_error", Some(domain_err.to_string()))
                    }
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::SameAccountTransfer => {
                        (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                    }
                    DomainError::InsufficientFunds { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "insufficient_funds",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::AccountNotEligible { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "account_not_eligible",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::DailyLimitExceeded { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "daily_limit_exceeded",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::InvalidTransferState { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "invalid_transfer_state",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::PrerequisiteNotMet(msg) => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "prerequisite_not_met",
                        Some(msg.clone()),
                    ),
                    DomainError::OtpExpired => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "otp_expired", None)
                    }
                    DomainError::OtpMismatch => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "otp_mismatch", None)
                    }
                    DomainError::OtpExhausted => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "otp_exhausted", None)
                    }
                    DomainError::OtpNotIssued => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "otp_not_issued", None)
                    }
                    DomainError::InvalidPin => (StatusCode::FORBIDDEN, "invalid_pin", None),
                    DomainError::Unauthorized(msg) => {
                        (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
                    }
                    DomainError::AccountNotFound(id) => {
                        (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
                    }
                    DomainError::TransferNotFound(id) => {
                        (StatusCode::NOT_FOUND, "transfer_not_found", Some(id.clone()))
                    }
                    DomainError::VersionConflict { expected, found } => (
                        StatusCode::CONFLICT,
                        "version_conflict",
                        Some(format!("expected {}, found {}", expected, found)),
                    ),
                }
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
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
