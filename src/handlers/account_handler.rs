//! Account Handler
//!
//! Account opening and sanitized reads. Opening generates a unique
//! 10-digit account number, stores only a salted digest of the PIN, and
//! seeds the default daily limits.

use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::otp::{generate_salt, salted_sha256};
use crate::domain::{AccountView, DomainError, OperationContext};
use crate::error::AppError;
use crate::ledger::{store, LedgerEntry};

use super::commands::OpenAccountCommand;

/// Default daily limits at opening
const DEFAULT_TRANSFER_LIMIT: &str = "10000.00";
const DEFAULT_WITHDRAWAL_LIMIT: &str = "5000.00";

/// Handler for account opening and queries
pub struct AccountHandler {
    pool: PgPool,
}

impl AccountHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new account.
    pub async fn open(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> Result<AccountView, AppError> {
        let mut missing = Vec::new();
        if command.holder_name.trim().is_empty() {
            missing.push("holder_name");
        }
        if command.email.trim().is_empty() {
            missing.push("email");
        }
        if command.pin.len() != 4 || !command.pin.chars().all(|c| c.is_ascii_digit()) {
            missing.push("pin: must be 4 digits");
        }
        if !missing.is_empty() {
            return Err(AppError::Domain(DomainError::validation(missing)));
        }

        let account_id = Uuid::new_v4();
        let account_number = self.unique_account_number().await?;
        let pin_salt = generate_salt();
        let pin_hash = salted_sha256(&command.pin, &pin_salt);

        let transfer_limit = command
            .daily_transfer_limit
            .unwrap_or_else(|| DEFAULT_TRANSFER_LIMIT.parse().expect("Invalid default limit"));
        let withdrawal_limit = command.daily_withdrawal_limit.unwrap_or_else(|| {
            DEFAULT_WITHDRAWAL_LIMIT.parse().expect("Invalid default limit")
        });

        if transfer_limit < Decimal::ZERO || withdrawal_limit < Decimal::ZERO {
            return Err(AppError::Domain(DomainError::validation(vec![
                "daily limits must be non-negative",
            ])));
        }

        let mut tx = self.pool.begin().await?;

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM accounts WHERE email = $1")
            .bind(&command.email)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() {
            return Err(AppError::InvalidRequest(
                "An account with this email already exists".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, account_number, holder_name, email, balance, status,
                kyc_approved, daily_transfer_limit, daily_withdrawal_limit,
                pin_hash, pin_salt, version
            )
            VALUES ($1, $2, $3, $4, 0, 'active', FALSE, $5, $6, $7, $8, 1)
            "#,
        )
        .bind(account_id)
        .bind(&account_number)
        .bind(command.holder_name.trim())
        .bind(command.email.trim())
        .bind(transfer_limit)
        .bind(withdrawal_limit)
        .bind(&pin_hash)
        .bind(&pin_salt)
        .execute(&mut *tx)
        .await?;

        AuditLogService::log_with(
            &mut *tx,
            AuditLogBuilder::new(AuditAction::AccountOpened)
                .resource_type("Account")
                .resource_id(account_id),
            context,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            account_number = %account_number,
            "Account opened"
        );

        let account = store::fetch_account(&self.pool, account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::Internal("Opened account vanished".to_string()))?;

        Ok(account.view())
    }

    /// Sanitized account lookup.
    pub async fn get(&self, account_id: Uuid) -> Result<AccountView, AppError> {
        let account = store::fetch_account(&self.pool, account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        Ok(account.view())
    }

    /// Recent ledger entries for an account, newest first.
    pub async fn ledger(&self, account_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>, AppError> {
        // 404 on unknown account rather than an empty list
        store::fetch_account(&self.pool, account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let entries = store::entry_history(&self.pool, account_id, limit.min(1000)).await?;
        Ok(entries)
    }

    /// Generate an unused 10-digit account number.
    async fn unique_account_number(&self) -> Result<String, AppError> {
        loop {
            let candidate = generate_account_number();
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM accounts WHERE account_number = $1")
                    .bind(&candidate)
                    .fetch_optional(&self.pool)
                    .await?;

            if exists.is_none() {
                return Ok(candidate);
            }
        }
    }
}

/// Random 10-digit account number with a non-zero leading digit.
fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    let first = rng.gen_range(1..=9);
    let rest: String = (0..9).map(|_| rng.gen_range(0..=9).to_string()).collect();
    format!("{}{}", first, rest)
}
