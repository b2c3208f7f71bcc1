//! Audit Log Service
//!
//! Attribution trail for balance-affecting operations. Admin adjustments
//! write their audit row inside the same transaction as the mutation, so a
//! balance change without an attributable record cannot exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Audit log entry for database storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub request_account_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AccountOpened,
    AdjustmentCredit,
    AdjustmentDebit,
    EntryReversed,
    TransferInitiated,
    TransferOtpSent,
    TransferCodeVerified,
    TransferCommitted,
    TransferRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountOpened => "account.opened",
            AuditAction::AdjustmentCredit => "adjustment.credit",
            AuditAction::AdjustmentDebit => "adjustment.debit",
            AuditAction::EntryReversed => "ledger.entry_reversed",
            AuditAction::TransferInitiated => "transfer.initiated",
            AuditAction::TransferOtpSent => "transfer.otp_sent",
            AuditAction::TransferCodeVerified => "transfer.code_verified",
            AuditAction::TransferCommitted => "transfer.committed",
            AuditAction::TransferRejected => "transfer.rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    detail: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            resource_type: None,
            resource_id: None,
            detail: None,
        }
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    pub fn resource_id(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn detail<T: Serialize>(mut self, detail: &T) -> Self {
        self.detail = serde_json::to_value(detail).ok();
        self
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry on the given executor.
    ///
    /// Pass the surrounding transaction to make the audit row part of the
    /// caller's atomic unit (required for admin adjustments).
    pub async fn log_with<'e, E>(
        executor: E,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError>
    where
        E: PgExecutor<'e>,
    {
        let id = Uuid::new_v4();

        let result: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO audit_logs (
                id, api_key_id, request_account_id, correlation_id,
                action, resource_type, resource_id, detail, client_ip
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(context.api_key_id)
        .bind(context.request_account_id)
        .bind(context.correlation_id)
        .bind(&builder.action)
        .bind(&builder.resource_type)
        .bind(builder.resource_id)
        .bind(&builder.detail)
        .bind(context.client_ip.map(|ip| ip.to_string()))
        .fetch_one(executor)
        .await?;

        tracing::debug!(
            audit_id = %result.0,
            action = %builder.action,
            "Audit log entry created"
        );

        Ok(result.0)
    }

    /// Write an audit log entry on the service's own pool.
    pub async fn log(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        Self::log_with(&self.pool, builder, context).await
    }

    /// Get recent audit logs, newest first.
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries: Vec<(
            Uuid,
            Option<Uuid>,
            Option<Uuid>,
            Option<Uuid>,
            String,
            Option<String>,
            Option<Uuid>,
            Option<serde_json::Value>,
            Option<String>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, api_key_id, request_account_id, correlation_id,
                   action, resource_type, resource_id, detail, client_ip, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries
            .into_iter()
            .map(
                |(
                    id,
                    api_key_id,
                    request_account_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    detail,
                    client_ip,
                    created_at,
                )| AuditLogEntry {
                    id,
                    api_key_id,
                    request_account_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    detail,
                    client_ip,
                    created_at,
                },
            )
            .collect())
    }
}
