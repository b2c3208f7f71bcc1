//! Transfer request state machine
//!
//! A TransferRequest is the transient record walking a transfer from
//! initiation through OTP verification to commit. Rows are kept for audit
//! after reaching a terminal state, never deleted.
//!
//! pending -> otp_sent -> otp_verified -> completed
//! with rejected / expired reachable from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use super::error::DomainError;
use super::otp::OtpChallenge;
use super::recipient::RecipientDetails;

/// Transfer request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    OtpSent,
    OtpVerified,
    Completed,
    Rejected,
    Expired,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::OtpSent => "otp_sent",
            TransferStatus::OtpVerified => "otp_verified",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "otp_sent" => Some(TransferStatus::OtpSent),
            "otp_verified" => Some(TransferStatus::OtpVerified),
            "completed" => Some(TransferStatus::Completed),
            "rejected" => Some(TransferStatus::Rejected),
            "expired" => Some(TransferStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Rejected | TransferStatus::Expired
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer request as loaded from the database.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: Uuid,
    pub sender_account_id: Uuid,
    pub amount: Amount,
    pub recipient: RecipientDetails,
    pub description: Option<String>,
    pub status: TransferStatus,
    /// Live or spent OTP challenge; None before the first send-otp
    pub otp: Option<OtpChallenge>,
    pub cot_verified: bool,
    pub imf_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRequest {
    /// A one-time code may be requested while the transfer awaits
    /// verification; re-requesting from `otp_sent` supersedes the previous
    /// code. Wire transfers additionally require the COT and IMF
    /// authorization codes to have been verified first.
    pub fn ensure_can_request_otp(&self) -> Result<(), DomainError> {
        match self.status {
            TransferStatus::Pending | TransferStatus::OtpSent => {}
            other => {
                return Err(DomainError::InvalidTransferState {
                    expected: "pending",
                    actual: other.to_string(),
                })
            }
        }

        if matches!(self.recipient, RecipientDetails::Wire { .. }) {
            if !self.cot_verified {
                return Err(DomainError::PrerequisiteNotMet(
                    "COT code not verified".to_string(),
                ));
            }
            if !self.imf_verified {
                return Err(DomainError::PrerequisiteNotMet(
                    "IMF code not verified".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn ensure_can_verify_otp(&self) -> Result<(), DomainError> {
        if self.status != TransferStatus::OtpSent {
            return Err(DomainError::InvalidTransferState {
                expected: "otp_sent",
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// A transfer may only be committed from `otp_verified`.
    pub fn ensure_can_commit(&self) -> Result<(), DomainError> {
        if self.status != TransferStatus::OtpVerified {
            return Err(DomainError::InvalidTransferState {
                expected: "otp_verified",
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Authorization codes may only be verified before the OTP stage.
    pub fn ensure_can_verify_code(&self) -> Result<(), DomainError> {
        if self.status != TransferStatus::Pending {
            return Err(DomainError::InvalidTransferState {
                expected: "pending",
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Sanitized representation: no OTP material, no raw metadata.
    pub fn view(&self) -> TransferView {
        TransferView {
            id: self.id,
            sender_account_id: self.sender_account_id,
            amount: self.amount,
            method: self.recipient.method().to_string(),
            recipient: self.recipient.summary(),
            description: self.description.clone(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Public projection of a transfer request.
#[derive(Debug, Clone, Serialize)]
pub struct TransferView {
    pub id: Uuid,
    pub sender_account_id: Uuid,
    pub amount: Amount,
    pub method: String,
    pub recipient: String,
    pub description: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}
