//! Ledger entries
//!
//! Immutable records of balance-affecting events. Amount and account fields
//! are write-once; only `status` may transition afterwards, and a reversal
//! is recorded as a fresh compensating entry rather than an edit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::SignedAmount;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "credit",
            EntryType::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryType::Credit),
            "debit" => Some(EntryType::Debit),
            _ => None,
        }
    }
}

impl From<&SignedAmount> for EntryType {
    fn from(delta: &SignedAmount) -> Self {
        match delta {
            SignedAmount::Credit(_) => EntryType::Credit,
            SignedAmount::Debit(_) => EntryType::Debit,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Rejected,
    Reversed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Rejected => "rejected",
            EntryStatus::Reversed => "reversed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "rejected" => Some(EntryStatus::Rejected),
            "reversed" => Some(EntryStatus::Reversed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted ledger entry.
///
/// Invariant: for `completed` entries,
/// `balance_after = balance_before + amount` for credits and
/// `balance_after = balance_before - amount` for debits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: EntryStatus,
    /// Unique per entry; doubles as the idempotency key
    pub reference: String,
    pub description: Option<String>,
    /// Serialized channel/recipient details for out-of-band settlement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_type_from_signed_amount() {
        let amount = Amount::new(dec!(10)).unwrap();
        assert_eq!(EntryType::from(&SignedAmount::Credit(amount)), EntryType::Credit);
        assert_eq!(EntryType::from(&SignedAmount::Debit(amount)), EntryType::Debit);
    }

    #[test]
    fn test_entry_type_round_trip() {
        assert_eq!(EntryType::parse("credit"), Some(EntryType::Credit));
        assert_eq!(EntryType::parse("debit"), Some(EntryType::Debit));
        assert_eq!(EntryType::parse("transfer"), None);
    }

    #[test]
    fn test_entry_status_round_trip() {
        for status in [
            EntryStatus::Pending,
            EntryStatus::Completed,
            EntryStatus::Rejected,
            EntryStatus::Reversed,
        ] {
            assert_eq!(EntryStatus::parse(status.as_str()), Some(status));
        }
    }
}
