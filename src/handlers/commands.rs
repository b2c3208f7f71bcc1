//! Command definitions
//!
//! Commands represent intentions to change the system state; results are
//! what handlers return to the API layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::RecipientDetails;
use crate::ledger::LedgerEntry;

/// Command to initiate a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateTransferCommand {
    /// Account the funds leave
    pub sender_account_id: Uuid,
    /// Amount as string for precise decimal handling
    pub amount: String,
    pub recipient: RecipientDetails,
    pub description: Option<String>,
    /// Transaction PIN, verified against the sender's stored digest
    pub pin: String,
}

/// Command for an admin manual adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustCommand {
    pub account_id: Uuid,
    pub kind: AdjustmentKind,
    pub amount: String,
    pub note: Option<String>,
}

/// Direction of a manual adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Credit,
    Debit,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Credit => "credit",
            AdjustmentKind::Debit => "debit",
        }
    }
}

/// Command to open a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    pub holder_name: String,
    pub email: String,
    /// Transaction PIN; only a salted digest is stored
    pub pin: String,
    pub daily_transfer_limit: Option<Decimal>,
    pub daily_withdrawal_limit: Option<Decimal>,
}

/// Prerequisite authorization code kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCodeKind {
    Cot,
    Imf,
}

impl AuthCodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthCodeKind::Cot => "cot",
            AuthCodeKind::Imf => "imf",
        }
    }
}

/// Result of requesting a one-time code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRequested {
    pub expires_in: i64,
}

/// Result of a committed transfer
#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub transfer_id: Uuid,
    pub status: String,
    pub sender_entry: LedgerEntry,
    /// Present for same-institution transfers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_entry: Option<LedgerEntry>,
}

/// Result of a manual adjustment
#[derive(Debug, Clone, Serialize)]
pub struct AdjustResult {
    pub account_id: Uuid,
    pub new_balance: Decimal,
    pub entry: LedgerEntry,
}
