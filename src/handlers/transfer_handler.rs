//! Transfer Handler
//!
//! Orchestrates a transfer from initiation through OTP verification to the
//! committed debit/credit pair. Same-institution transfers move both legs
//! inside one database transaction; external methods debit only and carry
//! the recipient details on the entry for out-of-band settlement.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{
    Account, Amount, DomainError, OperationContext, OtpChallenge, RecipientDetails, SignedAmount,
    TransferRequest, TransferStatus, OTP_TTL_SECONDS,
};
use crate::error::AppError;
use crate::ledger::{store, BalanceMutator, DeltaCommand, LedgerError};
use crate::notify::{dispatch, Notification, NotificationSender};

use super::commands::{AuthCodeKind, CommitResult, InitiateTransferCommand, OtpRequested};

/// Reference prefix shared by all transfer ledger entries; the daily-limit
/// window sums over it.
const TRANSFER_REF_PREFIX: &str = "TRF-";

const MAX_COMMIT_RETRIES: u32 = 3;

/// Handler for the transfer lifecycle
pub struct TransferHandler {
    audit: AuditLogService,
    notifier: Arc<dyn NotificationSender>,
    pool: PgPool,
}

impl TransferHandler {
    pub fn new(pool: PgPool, notifier: Arc<dyn NotificationSender>) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            notifier,
            pool,
        }
    }

    // =========================================================================
    // initiate
    // =========================================================================

    /// Validate and persist a new pending TransferRequest.
    ///
    /// Nothing moves here: funds are only touched by `commit`. Every
    /// validation failure happens before the row is written, so a transfer
    /// that cannot succeed never reaches `otp_sent`.
    pub async fn initiate(
        &self,
        command: InitiateTransferCommand,
        context: &OperationContext,
    ) -> Result<TransferRequest, AppError> {
        self.ensure_acting_account(context, command.sender_account_id)?;

        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        command.recipient.validate().map_err(AppError::Domain)?;

        let sender = store::fetch_account(&self.pool, command.sender_account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::AccountNotFound(command.sender_account_id.to_string()))?;

        verify_pin(&sender, &command.pin)?;

        let is_external = command.recipient.is_external();
        let delta = SignedAmount::Debit(amount);
        sender.check_eligible(&delta, is_external).map_err(AppError::Domain)?;

        if !sender.balance.is_sufficient_for(&amount) {
            return Err(AppError::Domain(DomainError::validation(vec![
                "amount: exceeds available balance",
            ])));
        }

        // Local transfers must name a real counterparty, and not the sender
        if let RecipientDetails::Local { account_number } = &command.recipient {
            let recipient = store::fetch_account_by_number(&self.pool, account_number)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| {
                    AppError::Domain(DomainError::validation(vec![
                        "recipient.account_number: unknown account",
                    ]))
                })?;

            if recipient.id == sender.id {
                return Err(AppError::Domain(DomainError::SameAccountTransfer));
            }
        }

        self.check_daily_limits(&sender, &amount, is_external).await?;

        let transfer_id = Uuid::new_v4();
        let recipient_json = serde_json::to_value(&command.recipient)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let (created_at, updated_at): (DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO transfer_requests (
                id, sender_account_id, amount, recipient, description, status
            )
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING created_at, updated_at
            "#,
        )
        .bind(transfer_id)
        .bind(sender.id)
        .bind(amount.value())
        .bind(&recipient_json)
        .bind(&command.description)
        .fetch_one(&self.pool)
        .await?;

        if let Err(e) = self
            .audit
            .log(
                AuditLogBuilder::new(AuditAction::TransferInitiated)
                    .resource_type("TransferRequest")
                    .resource_id(transfer_id)
                    .detail(&serde_json::json!({
                        "amount": amount.to_string(),
                        "method": command.recipient.method(),
                    })),
                context,
            )
            .await
        {
            tracing::warn!(error = %e, "Audit write failed for transfer initiation");
        }

        Ok(TransferRequest {
            id: transfer_id,
            sender_account_id: sender.id,
            amount,
            recipient: command.recipient,
            description: command.description,
            status: TransferStatus::Pending,
            otp: None,
            cot_verified: false,
            imf_verified: false,
            created_at,
            updated_at,
        })
    }

    /// Rolling 24h limits: all transfer debits count against the transfer
    /// limit; external methods also count against the withdrawal limit.
    async fn check_daily_limits(
        &self,
        sender: &Account,
        amount: &Amount,
        is_external: bool,
    ) -> Result<(), AppError> {
        let spent =
            store::debit_total_last_24h(&self.pool, sender.id, TRANSFER_REF_PREFIX).await?;
        let attempted = spent + amount.value();

        if attempted > sender.daily_transfer_limit {
            return Err(AppError::Domain(DomainError::DailyLimitExceeded {
                limit_kind: "transfer",
                limit: sender.daily_transfer_limit,
                attempted,
            }));
        }

        if is_external && attempted > sender.daily_withdrawal_limit {
            return Err(AppError::Domain(DomainError::DailyLimitExceeded {
                limit_kind: "withdrawal",
                limit: sender.daily_withdrawal_limit,
                attempted,
            }));
        }

        Ok(())
    }

    // =========================================================================
    // request_otp
    // =========================================================================

    /// Issue a one-time code for a pending transfer and dispatch it to the
    /// sender. A re-request supersedes any earlier code.
    pub async fn request_otp(
        &self,
        transfer_id: Uuid,
        context: &OperationContext,
    ) -> Result<OtpRequested, AppError> {
        let transfer = self.load_transfer(transfer_id).await?;
        self.ensure_acting_account(context, transfer.sender_account_id)?;

        transfer.ensure_can_request_otp().map_err(AppError::Domain)?;

        let issued = OtpChallenge::issue();
        let challenge = &issued.challenge;

        sqlx::query(
            r#"
            UPDATE transfer_requests
            SET status = 'otp_sent',
                otp_hash = $2, otp_salt = $3, otp_expires_at = $4, otp_attempts = 0,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .bind(challenge.code_hash())
        .bind(challenge.salt())
        .bind(challenge.expires_at())
        .execute(&self.pool)
        .await?;

        let sender = store::fetch_account(&self.pool, transfer.sender_account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::AccountNotFound(transfer.sender_account_id.to_string()))?;

        dispatch(
            self.notifier.clone(),
            Notification::transfer_otp(
                &sender.email,
                &issued.code,
                &transfer.amount,
                &transfer.recipient.summary(),
            ),
        );

        if let Err(e) = self
            .audit
            .log(
                AuditLogBuilder::new(AuditAction::TransferOtpSent)
                    .resource_type("TransferRequest")
                    .resource_id(transfer_id),
                context,
            )
            .await
        {
            tracing::warn!(error = %e, "Audit write failed for OTP issuance");
        }

        Ok(OtpRequested {
            expires_in: OTP_TTL_SECONDS,
        })
    }

    // =========================================================================
    // verify_otp
    // =========================================================================

    /// Verify a supplied one-time code. Exhausting the attempt budget
    /// forces the transfer to `rejected`.
    pub async fn verify_otp(
        &self,
        transfer_id: Uuid,
        code: &str,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        let transfer = self.load_transfer(transfer_id).await?;
        self.ensure_acting_account(context, transfer.sender_account_id)?;

        transfer.ensure_can_verify_otp().map_err(AppError::Domain)?;

        let mut challenge = transfer
            .otp
            .clone()
            .ok_or(AppError::Domain(DomainError::OtpNotIssued))?;

        match challenge.verify(code) {
            Ok(()) => {
                // Single use: the digest is cleared together with the
                // status transition
                sqlx::query(
                    r#"
                    UPDATE transfer_requests
                    SET status = 'otp_verified', otp_hash = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'otp_sent'
                    "#,
                )
                .bind(transfer_id)
                .execute(&self.pool)
                .await?;

                Ok(())
            }
            Err(DomainError::OtpExhausted) => {
                sqlx::query(
                    r#"
                    UPDATE transfer_requests
                    SET status = 'rejected', otp_attempts = $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(transfer_id)
                .bind(challenge.attempts())
                .execute(&self.pool)
                .await?;

                if let Err(e) = self
                    .audit
                    .log(
                        AuditLogBuilder::new(AuditAction::TransferRejected)
                            .resource_type("TransferRequest")
                            .resource_id(transfer_id)
                            .detail(&serde_json::json!({ "reason": "otp_exhausted" })),
                        context,
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Audit write failed for transfer rejection");
                }

                Err(AppError::Domain(DomainError::OtpExhausted))
            }
            Err(DomainError::OtpMismatch) => {
                sqlx::query(
                    "UPDATE transfer_requests SET otp_attempts = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(transfer_id)
                .bind(challenge.attempts())
                .execute(&self.pool)
                .await?;

                Err(AppError::Domain(DomainError::OtpMismatch))
            }
            Err(e) => Err(AppError::Domain(e)),
        }
    }

    // =========================================================================
    // verify_authorization_code
    // =========================================================================

    /// Verify a COT or IMF authorization code against the sender account's
    /// stored code, marking the matching prerequisite flag.
    pub async fn verify_authorization_code(
        &self,
        transfer_id: Uuid,
        kind: AuthCodeKind,
        code: &str,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        let transfer = self.load_transfer(transfer_id).await?;
        self.ensure_acting_account(context, transfer.sender_account_id)?;

        transfer.ensure_can_verify_code().map_err(AppError::Domain)?;

        let sender = store::fetch_account(&self.pool, transfer.sender_account_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::AccountNotFound(transfer.sender_account_id.to_string()))?;

        let expected = match kind {
            AuthCodeKind::Cot => sender.cot_code.as_deref(),
            AuthCodeKind::Imf => sender.imf_code.as_deref(),
        };

        match expected {
            Some(expected) if expected == code => {}
            _ => {
                return Err(AppError::Domain(DomainError::PrerequisiteNotMet(format!(
                    "{} code does not match",
                    kind.as_str().to_uppercase()
                ))))
            }
        }

        let column = match kind {
            AuthCodeKind::Cot => "cot_verified",
            AuthCodeKind::Imf => "imf_verified",
        };

        let sql = format!(
            "UPDATE transfer_requests SET {} = TRUE, updated_at = NOW() WHERE id = $1",
            column
        );
        sqlx::query(&sql).bind(transfer_id).execute(&self.pool).await?;

        if let Err(e) = self
            .audit
            .log(
                AuditLogBuilder::new(AuditAction::TransferCodeVerified)
                    .resource_type("TransferRequest")
                    .resource_id(transfer_id)
                    .detail(&serde_json::json!({ "kind": kind.as_str() })),
                context,
            )
            .await
        {
            tracing::warn!(error = %e, "Audit write failed for code verification");
        }

        Ok(())
    }

    // =========================================================================
    // commit
    // =========================================================================

    /// Move the money. Requires `otp_verified`.
    ///
    /// Both ledger legs, the transfer status transition, and the audit row
    /// share one transaction; on any failure nothing is applied. A replay
    /// (same transfer committed twice) returns the stored entries through
    /// the idempotent references.
    pub async fn commit(
        &self,
        transfer_id: Uuid,
        context: &OperationContext,
    ) -> Result<CommitResult, AppError> {
        let transfer = self.load_transfer(transfer_id).await?;
        self.ensure_acting_account(context, transfer.sender_account_id)?;

        transfer.ensure_can_commit().map_err(AppError::Domain)?;

        for attempt in 0..MAX_COMMIT_RETRIES {
            let mut tx = self.pool.begin().await?;

            match self.try_commit(&mut tx, &transfer, context).await {
                Ok(result) => {
                    tx.commit().await?;
                    self.send_receipt(&transfer, &result).await;
                    return Ok(result);
                }
                Err(LedgerError::Domain(DomainError::VersionConflict { .. }))
                    if attempt < MAX_COMMIT_RETRIES - 1 =>
                {
                    drop(tx);
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                    tracing::warn!(
                        transfer_id = %transfer_id,
                        "Version conflict during commit, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_COMMIT_RETRIES
                    );
                    continue;
                }
                Err(LedgerError::Domain(e @ DomainError::VersionConflict { .. })) => {
                    // Retries exhausted; the request stays otp_verified so
                    // the caller can try again
                    return Err(AppError::Domain(e));
                }
                Err(LedgerError::Domain(e)) => {
                    // Definitive business failure: the transaction rolled
                    // back, the request is rejected for audit
                    drop(tx);
                    sqlx::query(
                        "UPDATE transfer_requests SET status = 'rejected', updated_at = NOW() WHERE id = $1",
                    )
                    .bind(transfer_id)
                    .execute(&self.pool)
                    .await?;

                    if let Err(audit_err) = self
                        .audit
                        .log(
                            AuditLogBuilder::new(AuditAction::TransferRejected)
                                .resource_type("TransferRequest")
                                .resource_id(transfer_id)
                                .detail(&serde_json::json!({ "reason": e.to_string() })),
                            context,
                        )
                        .await
                    {
                        tracing::warn!(error = %audit_err, "Audit write failed for transfer rejection");
                    }

                    return Err(AppError::Domain(e));
                }
                Err(e) => return Err(AppError::from(e)),
            }
        }

        Err(AppError::from(LedgerError::MaxRetriesExceeded))
    }

    async fn try_commit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transfer: &TransferRequest,
        context: &OperationContext,
    ) -> Result<CommitResult, LedgerError> {
        let is_external = transfer.recipient.is_external();

        let debit_command = DeltaCommand {
            account_id: transfer.sender_account_id,
            delta: SignedAmount::Debit(transfer.amount),
            description: transfer
                .description
                .clone()
                .unwrap_or_else(|| format!("Transfer to {}", transfer.recipient.summary())),
            reference: format!("{}{}-D", TRANSFER_REF_PREFIX, transfer.id),
            withdrawal: is_external,
            metadata: if is_external {
                Some(serde_json::to_value(&transfer.recipient)?)
            } else {
                None
            },
        };

        let sender_outcome = BalanceMutator::apply_delta_in_tx(tx, &debit_command).await?;

        let receiver_entry = if let RecipientDetails::Local { account_number } = &transfer.recipient
        {
            let recipient = store::fetch_account_by_number(&mut **tx, account_number)
                .await?
                .ok_or(DomainError::AccountNotFound(account_number.clone()))?;

            let credit_command = DeltaCommand {
                account_id: recipient.id,
                delta: SignedAmount::Credit(transfer.amount),
                description: format!("Transfer from account {}", transfer.sender_account_id),
                reference: format!("{}{}-C", TRANSFER_REF_PREFIX, transfer.id),
                withdrawal: false,
                metadata: None,
            };

            Some(BalanceMutator::apply_delta_in_tx(tx, &credit_command).await?.entry)
        } else {
            None
        };

        sqlx::query(
            "UPDATE transfer_requests SET status = 'completed', updated_at = NOW() WHERE id = $1",
        )
        .bind(transfer.id)
        .execute(&mut **tx)
        .await?;

        if let Err(e) = AuditLogService::log_with(
            &mut **tx,
            AuditLogBuilder::new(AuditAction::TransferCommitted)
                .resource_type("TransferRequest")
                .resource_id(transfer.id)
                .detail(&serde_json::json!({
                    "amount": transfer.amount.to_string(),
                    "method": transfer.recipient.method(),
                    "sender_entry": sender_outcome.entry.id,
                })),
            context,
        )
        .await
        {
            tracing::warn!(error = %e, "Audit write failed for transfer commit");
        }

        Ok(CommitResult {
            transfer_id: transfer.id,
            status: TransferStatus::Completed.to_string(),
            sender_entry: sender_outcome.entry,
            receiver_entry,
        })
    }

    async fn send_receipt(&self, transfer: &TransferRequest, result: &CommitResult) {
        match store::fetch_account(&self.pool, transfer.sender_account_id).await {
            Ok(Some(sender)) => {
                dispatch(
                    self.notifier.clone(),
                    Notification::transfer_receipt(
                        &sender.email,
                        &transfer.amount,
                        &transfer.recipient.summary(),
                        &result.sender_entry.reference,
                    ),
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not load sender for receipt notification");
            }
        }
    }

    // =========================================================================
    // Queries and shared checks
    // =========================================================================

    /// Load a transfer request by id.
    pub async fn load_transfer(&self, transfer_id: Uuid) -> Result<TransferRequest, AppError> {
        type TransferRow = (
            Uuid,
            Uuid,
            Decimal,
            serde_json::Value,
            Option<String>,
            String,
            Option<String>,
            Option<String>,
            Option<DateTime<Utc>>,
            i32,
            bool,
            bool,
            DateTime<Utc>,
            DateTime<Utc>,
        );

        let row: Option<TransferRow> = sqlx::query_as(
            r#"
            SELECT id, sender_account_id, amount, recipient, description, status,
                   otp_hash, otp_salt, otp_expires_at, otp_attempts,
                   cot_verified, imf_verified, created_at, updated_at
            FROM transfer_requests
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        let (
            id,
            sender_account_id,
            amount,
            recipient,
            description,
            status,
            otp_hash,
            otp_salt,
            otp_expires_at,
            otp_attempts,
            cot_verified,
            imf_verified,
            created_at,
            updated_at,
        ) = row.ok_or_else(|| AppError::TransferNotFound(transfer_id.to_string()))?;

        let status = TransferStatus::parse(&status)
            .ok_or_else(|| AppError::Internal(format!("Unknown transfer status '{}'", status)))?;

        let otp = match (otp_salt, otp_expires_at) {
            (Some(salt), Some(expires_at)) => Some(OtpChallenge::from_parts(
                otp_hash,
                salt,
                expires_at,
                otp_attempts,
                status == TransferStatus::OtpVerified,
            )),
            _ => None,
        };

        Ok(TransferRequest {
            id,
            sender_account_id,
            amount: Amount::new(amount)
                .map_err(|e| AppError::Internal(format!("Corrupt transfer amount: {}", e)))?,
            recipient: serde_json::from_value(recipient)
                .map_err(|e| AppError::Internal(format!("Corrupt recipient details: {}", e)))?,
            description,
            status,
            otp,
            cot_verified,
            imf_verified,
            created_at,
            updated_at,
        })
    }

    /// The acting account (X-Request-Account-Id) must be the sender.
    fn ensure_acting_account(
        &self,
        context: &OperationContext,
        sender_account_id: Uuid,
    ) -> Result<(), AppError> {
        match context.request_account_id {
            Some(acting) if acting == sender_account_id => Ok(()),
            Some(_) => Err(AppError::Forbidden(
                "acting account does not match sender".to_string(),
            )),
            None => Err(AppError::MissingHeader("X-Request-Account-Id".to_string())),
        }
    }
}

/// Compare a supplied PIN against the account's stored salted digest.
fn verify_pin(account: &Account, pin: &str) -> Result<(), AppError> {
    let (hash, salt) = match (&account.pin_hash, &account.pin_salt) {
        (Some(hash), Some(salt)) => (hash, salt),
        _ => return Err(AppError::Domain(DomainError::InvalidPin)),
    };

    if crate::domain::otp::salted_sha256(pin, salt) != *hash {
        return Err(AppError::Domain(DomainError::InvalidPin));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountStatus, Balance};
    use rust_decimal_macros::dec;

    fn account_with_pin(pin: &str) -> Account {
        let salt = crate::domain::otp::generate_salt();
        let hash = crate::domain::otp::salted_sha256(pin, &salt);
        Account {
            id: Uuid::new_v4(),
            account_number: "0012345678".to_string(),
            holder_name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            balance: Balance::new(dec!(1000)).unwrap(),
            status: AccountStatus::Active,
            kyc_approved: true,
            daily_transfer_limit: dec!(10000),
            daily_withdrawal_limit: dec!(5000),
            pin_hash: Some(hash),
            pin_salt: Some(salt),
            cot_code: None,
            imf_code: None,
            version: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_verify_pin_accepts_correct_pin() {
        let account = account_with_pin("4321");
        assert!(verify_pin(&account, "4321").is_ok());
    }

    #[test]
    fn test_verify_pin_rejects_wrong_pin() {
        let account = account_with_pin("4321");
        assert!(matches!(
            verify_pin(&account, "0000"),
            Err(AppError::Domain(DomainError::InvalidPin))
        ));
    }

    #[test]
    fn test_verify_pin_rejects_account_without_pin() {
        let mut account = account_with_pin("4321");
        account.pin_hash = None;
        account.pin_salt = None;
        assert!(matches!(
            verify_pin(&account, "4321"),
            Err(AppError::Domain(DomainError::InvalidPin))
        ));
    }

    #[test]
    fn test_transfer_references_are_per_leg() {
        let transfer_id = Uuid::new_v4();
        let debit_ref = format!("{}{}-D", TRANSFER_REF_PREFIX, transfer_id);
        let credit_ref = format!("{}{}-C", TRANSFER_REF_PREFIX, transfer_id);

        assert_ne!(debit_ref, credit_ref);
        assert!(debit_ref.starts_with("TRF-"));
        assert!(credit_ref.starts_with("TRF-"));
    }
}
