//! Ledger and account persistence
//!
//! Row-level reads and writes for `accounts` and `ledger_entries`. All
//! balance-affecting writes go through `ledger::BalanceMutator`; the store
//! only exposes the primitives it composes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::domain::{Account, AccountStatus, Balance};

use super::entry::{EntryStatus, EntryType, LedgerEntry};

/// Errors from ledger persistence operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Ledger entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    #[error("Maximum retries exceeded for atomic balance update")]
    MaxRetriesExceeded,
}

type AccountRow = (
    Uuid,            // id
    String,          // account_number
    String,          // holder_name
    String,          // email
    Decimal,         // balance
    String,          // status
    bool,            // kyc_approved
    Decimal,         // daily_transfer_limit
    Decimal,         // daily_withdrawal_limit
    Option<String>,  // pin_hash
    Option<String>,  // pin_salt
    Option<String>,  // cot_code
    Option<String>,  // imf_code
    i64,             // version
    DateTime<Utc>,   // created_at
);

const ACCOUNT_COLUMNS: &str = r#"
    id, account_number, holder_name, email, balance, status, kyc_approved,
    daily_transfer_limit, daily_withdrawal_limit,
    pin_hash, pin_salt, cot_code, imf_code, version, created_at
"#;

fn account_from_row(row: AccountRow) -> Result<Account, LedgerError> {
    let (
        id,
        account_number,
        holder_name,
        email,
        balance,
        status,
        kyc_approved,
        daily_transfer_limit,
        daily_withdrawal_limit,
        pin_hash,
        pin_salt,
        cot_code,
        imf_code,
        version,
        created_at,
    ) = row;

    Ok(Account {
        id,
        account_number,
        holder_name,
        email,
        balance: Balance::new(balance)
            .map_err(|e| LedgerError::CorruptRow(format!("balance for {}: {}", id, e)))?,
        status: AccountStatus::parse(&status)
            .ok_or_else(|| LedgerError::CorruptRow(format!("status '{}' for {}", status, id)))?,
        kyc_approved,
        daily_transfer_limit,
        daily_withdrawal_limit,
        pin_hash,
        pin_salt,
        cot_code,
        imf_code,
        version,
        created_at,
    })
}

/// Fetch an account by id.
pub async fn fetch_account<'e, E>(executor: E, id: Uuid) -> Result<Option<Account>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
    let row: Option<AccountRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(account_from_row).transpose()
}

/// Fetch an account by its human-facing account number.
pub async fn fetch_account_by_number<'e, E>(
    executor: E,
    account_number: &str,
) -> Result<Option<Account>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM accounts WHERE account_number = $1",
        ACCOUNT_COLUMNS
    );
    let row: Option<AccountRow> = sqlx::query_as(&sql)
        .bind(account_number)
        .fetch_optional(executor)
        .await?;

    row.map(account_from_row).transpose()
}

type EntryRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    String,
    String,
    Option<String>,
    Option<serde_json::Value>,
    DateTime<Utc>,
);

const ENTRY_COLUMNS: &str = r#"
    id, account_id, entry_type, amount, balance_before, balance_after,
    status, reference, description, metadata, created_at
"#;

fn entry_from_row(row: EntryRow) -> Result<LedgerEntry, LedgerError> {
    let (
        id,
        account_id,
        entry_type,
        amount,
        balance_before,
        balance_after,
        status,
        reference,
        description,
        metadata,
        created_at,
    ) = row;

    Ok(LedgerEntry {
        id,
        account_id,
        entry_type: EntryType::parse(&entry_type).ok_or_else(|| {
            LedgerError::CorruptRow(format!("entry_type '{}' for {}", entry_type, id))
        })?,
        amount,
        balance_before,
        balance_after,
        status: EntryStatus::parse(&status).ok_or_else(|| {
            LedgerError::CorruptRow(format!("entry status '{}' for {}", status, id))
        })?,
        reference,
        description,
        metadata,
        created_at,
    })
}

/// Look up an entry by its unique reference (idempotency key).
pub async fn find_entry_by_reference<'e, E>(
    executor: E,
    reference: &str,
) -> Result<Option<LedgerEntry>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM ledger_entries WHERE reference = $1",
        ENTRY_COLUMNS
    );
    let row: Option<EntryRow> = sqlx::query_as(&sql)
        .bind(reference)
        .fetch_optional(executor)
        .await?;

    row.map(entry_from_row).transpose()
}

/// Fetch an entry by id.
pub async fn fetch_entry<'e, E>(executor: E, id: Uuid) -> Result<Option<LedgerEntry>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {} FROM ledger_entries WHERE id = $1", ENTRY_COLUMNS);
    let row: Option<EntryRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(entry_from_row).transpose()
}

/// Insert a completed ledger entry. Caller supplies the transaction so the
/// insert shares the atomic unit with its balance update.
#[allow(clippy::too_many_arguments)]
pub async fn insert_entry<'e, E>(
    executor: E,
    account_id: Uuid,
    entry_type: EntryType,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    reference: &str,
    description: Option<&str>,
    metadata: Option<&serde_json::Value>,
) -> Result<LedgerEntry, LedgerError>
where
    E: PgExecutor<'e>,
{
    let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO ledger_entries (
            account_id, entry_type, amount, balance_before, balance_after,
            status, reference, description, metadata
        )
        VALUES ($1, $2, $3, $4, $5, 'completed', $6, $7, $8)
        RETURNING id, created_at
        "#,
    )
    .bind(account_id)
    .bind(entry_type.as_str())
    .bind(amount)
    .bind(balance_before)
    .bind(balance_after)
    .bind(reference)
    .bind(description)
    .bind(metadata)
    .fetch_one(executor)
    .await?;

    Ok(LedgerEntry {
        id,
        account_id,
        entry_type,
        amount,
        balance_before,
        balance_after,
        status: EntryStatus::Completed,
        reference: reference.to_string(),
        description: description.map(|s| s.to_string()),
        metadata: metadata.cloned(),
        created_at,
    })
}

/// Transition an entry's status. Amount and account fields stay write-once.
pub async fn update_entry_status<'e, E>(
    executor: E,
    entry_id: Uuid,
    status: EntryStatus,
) -> Result<(), LedgerError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query("UPDATE ledger_entries SET status = $2 WHERE id = $1")
        .bind(entry_id)
        .bind(status.as_str())
        .execute(executor)
        .await?
        .rows_affected();

    if rows == 0 {
        return Err(LedgerError::EntryNotFound(entry_id));
    }

    Ok(())
}

/// Recent entries for an account, newest first.
pub async fn entry_history<'e, E>(
    executor: E,
    account_id: Uuid,
    limit: i64,
) -> Result<Vec<LedgerEntry>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {}
        FROM ledger_entries
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
        ENTRY_COLUMNS
    );
    let rows: Vec<EntryRow> = sqlx::query_as(&sql)
        .bind(account_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;

    rows.into_iter().map(entry_from_row).collect()
}

/// Sum of completed debits whose reference starts with `reference_prefix`
/// within the trailing 24 hours. Used for rolling daily limits.
pub async fn debit_total_last_24h<'e, E>(
    executor: E,
    account_id: Uuid,
    reference_prefix: &str,
) -> Result<Decimal, LedgerError>
where
    E: PgExecutor<'e>,
{
    let total: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT SUM(amount)
        FROM ledger_entries
        WHERE account_id = $1
          AND entry_type = 'debit'
          AND status = 'completed'
          AND reference LIKE $2 || '%'
          AND created_at > NOW() - INTERVAL '24 hours'
        "#,
    )
    .bind(account_id)
    .bind(reference_prefix)
    .fetch_one(executor)
    .await?;

    Ok(total.unwrap_or(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_from_row_rejects_unknown_status() {
        let row: AccountRow = (
            Uuid::new_v4(),
            "0012345678".into(),
            "Alice".into(),
            "alice@example.com".into(),
            dec!(10),
            "frozen".into(),
            true,
            dec!(10000),
            dec!(5000),
            None,
            None,
            None,
            None,
            1,
            Utc::now(),
        );

        assert!(matches!(
            account_from_row(row),
            Err(LedgerError::CorruptRow(_))
        ));
    }

    #[test]
    fn test_account_from_row_rejects_negative_balance() {
        let row: AccountRow = (
            Uuid::new_v4(),
            "0012345678".into(),
            "Alice".into(),
            "alice@example.com".into(),
            dec!(-1),
            "active".into(),
            true,
            dec!(10000),
            dec!(5000),
            None,
            None,
            None,
            None,
            1,
            Utc::now(),
        );

        assert!(matches!(
            account_from_row(row),
            Err(LedgerError::CorruptRow(_))
        ));
    }

    #[test]
    fn test_entry_from_row_maps_types() {
        let id = Uuid::new_v4();
        let row: EntryRow = (
            id,
            Uuid::new_v4(),
            "debit".into(),
            dec!(25.00),
            dec!(100.00),
            dec!(75.00),
            "completed".into(),
            "TRF-x-D".into(),
            Some("transfer".into()),
            None,
            Utc::now(),
        );

        let entry = entry_from_row(row).unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.entry_type, EntryType::Debit);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.balance_after, dec!(75.00));
    }
}
