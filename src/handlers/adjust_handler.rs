//! Adjustment Handler
//!
//! Admin manual credit/debit on a single account. A thin wrapper over the
//! Balance Mutator: the caller's elevated privilege is checked at the API
//! boundary, and the audit row referencing the acting key is written inside
//! the same transaction as the mutation, so every manual balance change is
//! attributable.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{Amount, DomainError, OperationContext, SignedAmount};
use crate::error::AppError;
use crate::ledger::{store, BalanceMutator, DeltaCommand, LedgerError, MutationOutcome};
use crate::notify::{dispatch, Notification, NotificationSender};

use super::commands::{AdjustCommand, AdjustResult, AdjustmentKind};

const MAX_RETRIES: u32 = 3;

/// Handler for admin manual adjustments
pub struct AdjustHandler {
    notifier: Arc<dyn NotificationSender>,
    pool: PgPool,
}

impl AdjustHandler {
    pub fn new(pool: PgPool, notifier: Arc<dyn NotificationSender>) -> Self {
        Self { notifier, pool }
    }

    /// Execute the adjustment.
    ///
    /// `idempotency_key`, when supplied, becomes the ledger entry
    /// reference: replaying the same key returns the stored entry without
    /// touching the balance again. An over-debit is rejected with
    /// `InsufficientFunds`, never clamped.
    pub async fn execute(
        &self,
        command: AdjustCommand,
        idempotency_key: Option<String>,
        context: &OperationContext,
    ) -> Result<AdjustResult, AppError> {
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        let delta = match command.kind {
            AdjustmentKind::Credit => SignedAmount::Credit(amount),
            AdjustmentKind::Debit => SignedAmount::Debit(amount),
        };

        let note = command.note.clone().unwrap_or_else(|| "Manual".to_string());
        let description = format!("Admin {} - {}", command.kind.as_str(), note);
        let reference =
            idempotency_key.unwrap_or_else(|| format!("ADJ-{}", Uuid::new_v4().simple()));

        let delta_command = DeltaCommand {
            account_id: command.account_id,
            delta,
            description,
            reference,
            withdrawal: false,
            metadata: None,
        };

        let action = match command.kind {
            AdjustmentKind::Credit => AuditAction::AdjustmentCredit,
            AdjustmentKind::Debit => AuditAction::AdjustmentDebit,
        };

        let outcome = self
            .apply_with_audit(&delta_command, action, &command, context)
            .await?;

        if !outcome.replayed {
            self.notify_holder(&command, &amount, &outcome).await;
        }

        Ok(AdjustResult {
            account_id: command.account_id,
            new_balance: outcome.entry.balance_after,
            entry: outcome.entry,
        })
    }

    /// Reverse a previously applied entry with a compensating entry.
    pub async fn reverse(
        &self,
        entry_id: Uuid,
        reason: &str,
        context: &OperationContext,
    ) -> Result<AdjustResult, AppError> {
        let mutator = BalanceMutator::new(self.pool.clone());
        let outcome = mutator.reverse_entry(entry_id, reason).await?;

        let audit = AuditLogService::new(self.pool.clone());
        if let Err(e) = audit
            .log(
                AuditLogBuilder::new(AuditAction::EntryReversed)
                    .resource_type("LedgerEntry")
                    .resource_id(entry_id)
                    .detail(&serde_json::json!({ "reason": reason })),
                context,
            )
            .await
        {
            tracing::warn!(error = %e, "Audit write failed for reversal");
        }

        Ok(AdjustResult {
            account_id: outcome.entry.account_id,
            new_balance: outcome.entry.balance_after,
            entry: outcome.entry,
        })
    }

    /// Mutation plus audit row in one transaction, retried on version
    /// conflicts like the mutator's own wrapper.
    async fn apply_with_audit(
        &self,
        delta_command: &DeltaCommand,
        action: AuditAction,
        command: &AdjustCommand,
        context: &OperationContext,
    ) -> Result<MutationOutcome, AppError> {
        for attempt in 0..MAX_RETRIES {
            let mut tx = self.pool.begin().await?;

            match BalanceMutator::apply_delta_in_tx(&mut tx, delta_command).await {
                Ok(outcome) => {
                    if !outcome.replayed {
                        AuditLogService::log_with(
                            &mut *tx,
                            AuditLogBuilder::new(action)
                                .resource_type("Account")
                                .resource_id(command.account_id)
                                .detail(&serde_json::json!({
                                    "amount": command.amount,
                                    "note": command.note,
                                    "entry_id": outcome.entry.id,
                                })),
                            context,
                        )
                        .await
                        .map_err(|e| AppError::Internal(e.to_string()))?;
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
                Err(e) => return Err(AppError::from(e)),
            }
        }

        Err(AppError::from(LedgerError::MaxRetriesExceeded))
    }

    async fn notify_holder(
        &self,
        command: &AdjustCommand,
        amount: &Amount,
        outcome: &MutationOutcome,
    ) {
        match store::fetch_account(&self.pool, command.account_id).await {
            Ok(Some(account)) => {
                dispatch(
                    self.notifier.clone(),
                    Notification::adjustment_notice(
                        &account.email,
                        command.kind.as_str(),
                        amount,
                        &format!("{:.2}", outcome.entry.balance_after),
                    ),
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not load account for adjustment notice");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_command_parses_kind() {
        let json = r#"{
            "account_id": "550e8400-e29b-41d4-a716-446655440000",
            "kind": "debit",
            "amount": "25.00",
            "note": "fee correction"
        }"#;

        let command: AdjustCommand = serde_json::from_str(json).unwrap();
        assert_eq!(command.kind, AdjustmentKind::Debit);
        assert_eq!(command.amount, "25.00");
    }

    #[test]
    fn test_generated_reference_has_adjustment_prefix() {
        let reference = format!("ADJ-{}", Uuid::new_v4().simple());
        assert!(reference.starts_with("ADJ-"));
        assert!(reference.len() > 4);
    }
}
