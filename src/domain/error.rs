//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant
/// failures. They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Insufficient funds for a debit operation
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// Account status forbids this mutation
    #[error("Account is not eligible: {reason}")]
    AccountNotEligible { reason: String },

    /// Invalid amount (zero, negative, wrong scale, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Request fails input validation; lists the offending fields
    #[error("Validation failed: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transfer request not found
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Rolling 24h transfer or withdrawal limit exceeded
    #[error("Daily {limit_kind} limit exceeded: limit {limit}, attempted {attempted}")]
    DailyLimitExceeded {
        limit_kind: &'static str,
        limit: rust_decimal::Decimal,
        attempted: rust_decimal::Decimal,
    },

    /// Operation not valid for the transfer's current status
    #[error("Transfer is in state '{actual}', expected '{expected}'")]
    InvalidTransferState {
        expected: &'static str,
        actual: String,
    },

    /// A prerequisite authorization code has not been verified yet
    #[error("Prerequisite not met: {0}")]
    PrerequisiteNotMet(String),

    /// One-time code expired before verification
    #[error("One-time code has expired")]
    OtpExpired,

    /// Supplied one-time code does not match
    #[error("One-time code does not match")]
    OtpMismatch,

    /// Too many failed verification attempts
    #[error("One-time code attempts exhausted")]
    OtpExhausted,

    /// No live one-time code challenge exists
    #[error("No one-time code has been issued")]
    OtpNotIssued,

    /// Transaction PIN digest mismatch
    #[error("Invalid transaction PIN")]
    InvalidPin,

    /// Unauthorized operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Concurrent modification detected (optimistic locking)
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: i64, found: i64 },
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self::InsufficientFunds { required, available }
    }

    /// Create an account not eligible error
    pub fn not_eligible(reason: impl Into<String>) -> Self {
        Self::AccountNotEligible {
            reason: reason.into(),
        }
    }

    /// Create a validation error over a set of field names
    pub fn validation(fields: Vec<impl Into<String>>) -> Self {
        Self::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::VersionConflict { .. })
    }

    /// Check if this is a conflict error (retry may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.is_client_error());
        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_not_eligible_error() {
        let err = DomainError::not_eligible("account is blocked");

        assert!(err.is_client_error());
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = DomainError::validation(vec!["swift_code", "account_number"]);
        assert_eq!(err.to_string(), "Validation failed: swift_code, account_number");
    }

    #[test]
    fn test_version_conflict_error() {
        let err = DomainError::VersionConflict {
            expected: 1,
            found: 2,
        };

        assert!(!err.is_client_error());
        assert!(err.is_conflict_error());
    }
}
