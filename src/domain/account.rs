//! Account model
//!
//! Account rows carry the current balance plus the status and limit fields
//! that gate mutations. Balances are only ever written through the
//! `ledger::BalanceMutator`; everything here is read-side policy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::{Amount, Balance, SignedAmount};
use super::error::DomainError;

/// Account status
///
/// Gates which balance mutations are permitted. Debits require `Active`;
/// credits are accepted for anything except `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Dormant,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Dormant => "dormant",
            AccountStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "dormant" => Some(AccountStatus::Dormant),
            "blocked" => Some(AccountStatus::Blocked),
            _ => None,
        }
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account row as loaded from the database.
///
/// Secret material (PIN digest, authorization code digests) lives here for
/// verification but is never serialized; API responses go through
/// [`AccountView`].
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub account_number: String,
    pub holder_name: String,
    pub email: String,
    pub balance: Balance,
    pub status: AccountStatus,
    pub kyc_approved: bool,
    pub daily_transfer_limit: Decimal,
    pub daily_withdrawal_limit: Decimal,
    pub pin_hash: Option<String>,
    pub pin_salt: Option<String>,
    pub cot_code: Option<String>,
    pub imf_code: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Check whether `delta` may be applied given the account's status.
    ///
    /// `withdrawal` marks debits leaving the institution, which are
    /// additionally KYC-gated.
    pub fn check_eligible(&self, delta: &SignedAmount, withdrawal: bool) -> Result<(), DomainError> {
        if self.status == AccountStatus::Blocked {
            return Err(DomainError::not_eligible("account is blocked"));
        }

        if delta.is_debit() {
            match self.status {
                AccountStatus::Active => {}
                AccountStatus::Suspended => {
                    return Err(DomainError::not_eligible("account is suspended"))
                }
                AccountStatus::Dormant => {
                    return Err(DomainError::not_eligible("account is dormant"))
                }
                AccountStatus::Blocked => unreachable!(),
            }

            if withdrawal && !self.kyc_approved {
                return Err(DomainError::not_eligible(
                    "KYC verification required for withdrawals",
                ));
            }
        }

        Ok(())
    }

    /// Check that the balance covers a debit of `amount`.
    pub fn check_sufficient(&self, amount: &Amount) -> Result<(), DomainError> {
        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }
        Ok(())
    }

    /// Sanitized representation safe to serialize to callers.
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            account_number: self.account_number.clone(),
            holder_name: self.holder_name.clone(),
            balance: self.balance.value(),
            status: self.status,
            kyc_approved: self.kyc_approved,
            daily_transfer_limit: self.daily_transfer_limit,
            daily_withdrawal_limit: self.daily_withdrawal_limit,
            created_at: self.created_at,
        }
    }
}

/// Public projection of an account. PIN and authorization code digests are
/// deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub account_number: String,
    pub holder_name: String,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub kyc_approved: bool,
    pub daily_transfer_limit: Decimal,
    pub daily_withdrawal_limit: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_account(status: AccountStatus, balance: Decimal) -> Account {
        Account {
            id: Uuid::new_v4(),
            account_number: "0012345678".to_string(),
            holder_name: "Alice Example".to_string(),
            email: "alice@example.com".to_string(),
            balance: Balance::new(balance).unwrap(),
            status,
            kyc_approved: true,
            daily_transfer_limit: dec!(10000),
            daily_withdrawal_limit: dec!(5000),
            pin_hash: None,
            pin_salt: None,
            cot_code: None,
            imf_code: None,
            version: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_account_can_debit_and_credit() {
        let account = test_account(AccountStatus::Active, dec!(100));
        let amount = Amount::new(dec!(50)).unwrap();

        assert!(account
            .check_eligible(&SignedAmount::Debit(amount), false)
            .is_ok());
        assert!(account
            .check_eligible(&SignedAmount::Credit(amount), false)
            .is_ok());
    }

    #[test]
    fn test_blocked_account_rejects_everything() {
        let account = test_account(AccountStatus::Blocked, dec!(100));
        let amount = Amount::new(dec!(50)).unwrap();

        assert!(matches!(
            account.check_eligible(&SignedAmount::Debit(amount), false),
            Err(DomainError::AccountNotEligible { .. })
        ));
        assert!(matches!(
            account.check_eligible(&SignedAmount::Credit(amount), false),
            Err(DomainError::AccountNotEligible { .. })
        ));
    }

    #[test]
    fn test_suspended_account_accepts_credit_rejects_debit() {
        let account = test_account(AccountStatus::Suspended, dec!(100));
        let amount = Amount::new(dec!(50)).unwrap();

        assert!(account
            .check_eligible(&SignedAmount::Credit(amount), false)
            .is_ok());
        assert!(matches!(
            account.check_eligible(&SignedAmount::Debit(amount), false),
            Err(DomainError::AccountNotEligible { .. })
        ));
    }

    #[test]
    fn test_withdrawal_requires_kyc() {
        let mut account = test_account(AccountStatus::Active, dec!(100));
        account.kyc_approved = false;
        let amount = Amount::new(dec!(50)).unwrap();

        // Internal debit is fine
        assert!(account
            .check_eligible(&SignedAmount::Debit(amount), false)
            .is_ok());

        // Withdrawal is KYC-gated
        let err = account
            .check_eligible(&SignedAmount::Debit(amount), true)
            .unwrap_err();
        assert!(err.to_string().contains("KYC"));
    }

    #[test]
    fn test_check_sufficient() {
        let account = test_account(AccountStatus::Active, dec!(100));

        assert!(account.check_sufficient(&Amount::new(dec!(100)).unwrap()).is_ok());
        assert!(matches!(
            account.check_sufficient(&Amount::new(dec!(100.01)).unwrap()),
            Err(DomainError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_view_omits_secrets() {
        let mut account = test_account(AccountStatus::Active, dec!(100));
        account.pin_hash = Some("deadbeef".to_string());
        account.cot_code = Some("cafef00d".to_string());

        let json = serde_json::to_string(&account.view()).unwrap();
        assert!(!json.contains("deadbeef"));
        assert!(!json.contains("cafef00d"));
        assert!(!json.contains("pin"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Dormant,
            AccountStatus::Blocked,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::parse("frozen"), None);
    }
}
