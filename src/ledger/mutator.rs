//! Balance Mutator
//!
//! The single authority for balance writes. Every mutation updates the
//! account balance and appends the matching ledger entry inside one
//! database transaction; a partial write cannot be observed.
//!
//! Concurrent mutations against the same account serialize through an
//! optimistic version check on the account row: the conditional UPDATE
//! carries the version read at the start of the transaction, and a
//! mismatch aborts the whole unit. The public wrapper retries a bounded
//! number of times before surfacing the conflict.

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{DomainError, SignedAmount};

use super::entry::{EntryStatus, EntryType, LedgerEntry};
use super::store::{self, LedgerError};

const MAX_RETRIES: u32 = 3;

/// A requested balance mutation.
#[derive(Debug, Clone)]
pub struct DeltaCommand {
    pub account_id: Uuid,
    pub delta: SignedAmount,
    pub description: String,
    /// Unique reference; doubles as the idempotency key. A command replayed
    /// with the same reference returns the original entry untouched.
    pub reference: String,
    /// Marks debits leaving the institution (KYC-gated)
    pub withdrawal: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of a mutation: the entry plus whether this call created it.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub entry: LedgerEntry,
    /// True when the reference already existed and the stored entry was
    /// returned instead of applying the delta again
    pub replayed: bool,
}

/// Balance Mutator service.
#[derive(Debug, Clone)]
pub struct BalanceMutator {
    pool: PgPool,
}

impl BalanceMutator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a signed delta in its own transaction, retrying on version
    /// conflicts with backoff.
    pub async fn apply_delta(&self, command: &DeltaCommand) -> Result<MutationOutcome, LedgerError> {
        for attempt in 0..MAX_RETRIES {
            let mut tx = self.pool.begin().await?;

            match Self::apply_delta_in_tx(&mut tx, command).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    return Ok(outcome);
                }
                Err(LedgerError::Domain(DomainError::VersionConflict { .. }))
                    if attempt < MAX_RETRIES - 1 =>
                {
                    drop(tx);
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    tracing::warn!(
                        account_id = %command.account_id,
                        "Version conflict, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_RETRIES
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::MaxRetriesExceeded)
    }

    /// Apply a signed delta inside a caller-owned transaction.
    ///
    /// Used by the transfer commit to put both legs of a paired
    /// debit/credit into one atomic unit. The caller must commit or roll
    /// back; nothing is visible until it does.
    pub async fn apply_delta_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        command: &DeltaCommand,
    ) -> Result<MutationOutcome, LedgerError> {
        // Idempotency: a reference that already exists short-circuits
        if let Some(existing) = store::find_entry_by_reference(&mut **tx, &command.reference).await?
        {
            tracing::debug!(
                reference = %command.reference,
                entry_id = %existing.id,
                "Reference already applied, returning stored entry"
            );
            return Ok(MutationOutcome {
                entry: existing,
                replayed: true,
            });
        }

        let account = store::fetch_account(&mut **tx, command.account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(command.account_id))?;

        account.check_eligible(&command.delta, command.withdrawal)?;

        let amount = command.delta.magnitude();
        if command.delta.is_debit() {
            account.check_sufficient(&amount)?;
        }

        let balance_before = account.balance;
        let balance_after = balance_before
            .apply(&command.delta)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        // Conditional write: the version read above must still be current
        let rows = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $3
            "#,
        )
        .bind(account.id)
        .bind(balance_after.value())
        .bind(account.version)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(DomainError::VersionConflict {
                expected: account.version,
                found: account.version + 1,
            }
            .into());
        }

        let entry = store::insert_entry(
            &mut **tx,
            account.id,
            EntryType::from(&command.delta),
            amount.value(),
            balance_before.value(),
            balance_after.value(),
            &command.reference,
            Some(command.description.as_str()),
            command.metadata.as_ref(),
        )
        .await?;

        tracing::info!(
            account_id = %account.id,
            entry_id = %entry.id,
            entry_type = %entry.entry_type,
            amount = %amount,
            balance_after = %balance_after,
            "Balance mutated"
        );

        Ok(MutationOutcome {
            entry,
            replayed: false,
        })
    }

    /// Reverse a completed entry with a fresh compensating entry.
    ///
    /// The compensating write and the status transition of the original
    /// share one transaction. Reversing twice is idempotent through the
    /// derived `REV-` reference.
    pub async fn reverse_entry(
        &self,
        entry_id: Uuid,
        reason: &str,
    ) -> Result<MutationOutcome, LedgerError> {
        for attempt in 0..MAX_RETRIES {
            let mut tx = self.pool.begin().await?;

            let original = store::fetch_entry(&mut *tx, entry_id)
                .await?
                .ok_or(LedgerError::EntryNotFound(entry_id))?;

            if original.status != EntryStatus::Completed && original.status != EntryStatus::Reversed
            {
                return Err(DomainError::InvalidTransferState {
                    expected: "completed",
                    actual: original.status.to_string(),
                }
                .into());
            }

            let amount = crate::domain::Amount::new(original.amount)
                .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;
            let delta = match original.entry_type {
                EntryType::Credit => SignedAmount::Debit(amount),
                EntryType::Debit => SignedAmount::Credit(amount),
            };

            let command = DeltaCommand {
                account_id: original.account_id,
                delta,
                description: format!("Reversal: {}", reason),
                reference: format!("REV-{}", original.reference),
                withdrawal: false,
                metadata: Some(serde_json::json!({ "reverses": original.id })),
            };

            match Self::apply_delta_in_tx(&mut tx, &command).await {
                Ok(outcome) => {
                    if !outcome.replayed {
                        store::update_entry_status(&mut *tx, original.id, EntryStatus::Reversed)
                            .await?;
                    }
                    tx.commit().await?;
                    return Ok(outcome);
                }
                Err(LedgerError::Domain(DomainError::VersionConflict { .. }))
                    if attempt < MAX_RETRIES - 1 =>
                {
                    drop(tx);
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::MaxRetriesExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_delta_command_shape() {
        let command = DeltaCommand {
            account_id: Uuid::new_v4(),
            delta: SignedAmount::Credit(Amount::new(dec!(250.00)).unwrap()),
            description: "Admin credit - bonus".to_string(),
            reference: "ADJ-test-1".to_string(),
            withdrawal: false,
            metadata: None,
        };

        assert!(!command.delta.is_debit());
        assert_eq!(command.delta.magnitude().value(), dec!(250.00));
    }

    #[test]
    fn test_version_conflict_is_retryable_domain_error() {
        let err: LedgerError = DomainError::VersionConflict {
            expected: 3,
            found: 4,
        }
        .into();

        assert!(matches!(
            err,
            LedgerError::Domain(DomainError::VersionConflict { .. })
        ));
    }
}
