//! Recipient details
//!
//! Tagged union of per-method recipient fields. Each transfer method carries
//! its own required-field set, validated at the orchestrator boundary
//! instead of an open metadata map.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Recipient of a transfer, keyed by transfer method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RecipientDetails {
    /// Same-institution transfer to another account
    Local { account_number: String },

    /// International wire transfer
    Wire {
        account_name: String,
        account_number: String,
        bank_name: String,
        swift_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bank_address: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        country: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iban: Option<String>,
    },

    /// Cryptocurrency withdrawal
    Crypto {
        wallet_address: String,
        #[serde(default = "default_crypto_currency")]
        currency: String,
        #[serde(default = "default_crypto_network")]
        network: String,
    },

    /// Withdrawal to a third-party payment service (PayPal, Wise, Cash App,
    /// Zelle, Venmo, Revolut, ...)
    PaymentHandle {
        provider: String,
        handle: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        holder_name: Option<String>,
    },
}

fn default_crypto_currency() -> String {
    "BTC".to_string()
}

fn default_crypto_network() -> String {
    "native".to_string()
}

impl RecipientDetails {
    /// The wire-format method tag.
    pub fn method(&self) -> &'static str {
        match self {
            RecipientDetails::Local { .. } => "local",
            RecipientDetails::Wire { .. } => "wire",
            RecipientDetails::Crypto { .. } => "crypto",
            RecipientDetails::PaymentHandle { .. } => "payment_handle",
        }
    }

    /// True when funds leave the institution (debit-only commit, KYC-gated).
    pub fn is_external(&self) -> bool {
        !matches!(self, RecipientDetails::Local { .. })
    }

    /// Validate the required fields for this method.
    ///
    /// Returns `DomainError::Validation` naming every blank required field,
    /// so the caller sees the full list at once.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut missing: Vec<String> = Vec::new();

        let mut require = |name: &str, value: &str| {
            if value.trim().is_empty() {
                missing.push(name.to_string());
            }
        };

        match self {
            RecipientDetails::Local { account_number } => {
                require("account_number", account_number);
            }
            RecipientDetails::Wire {
                account_name,
                account_number,
                bank_name,
                swift_code,
                ..
            } => {
                require("account_name", account_name);
                require("account_number", account_number);
                require("bank_name", bank_name);
                require("swift_code", swift_code);
            }
            RecipientDetails::Crypto { wallet_address, .. } => {
                require("wallet_address", wallet_address);
            }
            RecipientDetails::PaymentHandle {
                provider, handle, ..
            } => {
                require("provider", provider);
                require("handle", handle);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation { fields: missing })
        }
    }

    /// Short human-readable summary for ledger descriptions and receipts.
    pub fn summary(&self) -> String {
        match self {
            RecipientDetails::Local { account_number } => {
                format!("account {}", account_number)
            }
            RecipientDetails::Wire {
                account_name,
                bank_name,
                ..
            } => format!("{} via {}", account_name, bank_name),
            RecipientDetails::Crypto {
                wallet_address,
                currency,
                ..
            } => format!("{} wallet {}", currency, wallet_address),
            RecipientDetails::PaymentHandle {
                provider, handle, ..
            } => format!("{} {}", provider, handle),
        }
    }
}
