//! Balance Mutator Integration Tests
//!
//! Atomicity, idempotency, and serialization properties against a real
//! database. Requires DATABASE_URL.

use rust_decimal_macros::dec;
use uuid::Uuid;

use bankcore::domain::{Amount, DomainError, SignedAmount};
use bankcore::ledger::{BalanceMutator, DeltaCommand, EntryStatus, EntryType, LedgerError};

mod common;

fn credit(account_id: Uuid, amount: &str, reference: &str) -> DeltaCommand {
    DeltaCommand {
        account_id,
        delta: SignedAmount::Credit(amount.parse::<Amount>().unwrap()),
        description: "test credit".to_string(),
        reference: reference.to_string(),
        withdrawal: false,
        metadata: None,
    }
}

fn debit(account_id: Uuid, amount: &str, reference: &str) -> DeltaCommand {
    DeltaCommand {
        account_id,
        delta: SignedAmount::Debit(amount.parse::<Amount>().unwrap()),
        description: "test debit".to_string(),
        reference: reference.to_string(),
        withdrawal: false,
        metadata: None,
    }
}

#[tokio::test]
async fn test_apply_delta_writes_balance_and_entry_together() {
    let pool = common::setup_test_db().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let account = common::seed_account(
        &pool,
        "Mutator A",
        &format!("mutator-a-{}@test.example", suffix),
        dec!(1000.00),
    )
    .await;

    let mutator = BalanceMutator::new(pool.clone());
    let reference = format!("TST-{}", Uuid::new_v4().simple());

    let outcome = mutator
        .apply_delta(&credit(account, "250.00", &reference))
        .await
        .unwrap();

    assert!(!outcome.replayed);
    assert_eq!(outcome.entry.entry_type, EntryType::Credit);
    assert_eq!(outcome.entry.amount, dec!(250.00));
    assert_eq!(outcome.entry.balance_before, dec!(1000.00));
    assert_eq!(outcome.entry.balance_after, dec!(1250.00));
    assert_eq!(outcome.entry.status, EntryStatus::Completed);

    let balance: rust_decimal::Decimal =
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(1250.00));
}

#[tokio::test]
async fn test_over_debit_leaves_no_trace() {
    let pool = common::setup_test_db().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let account = common::seed_account(
        &pool,
        "Mutator B",
        &format!("mutator-b-{}@test.example", suffix),
        dec!(100.00),
    )
    .await;

    let mutator = BalanceMutator::new(pool.clone());
    let reference = format!("TST-{}", Uuid::new_v4().simple());

    let result = mutator.apply_delta(&debit(account, "100.01", &reference)).await;
    assert!(matches!(
        result,
        Err(LedgerError::Domain(DomainError::InsufficientFunds { .. }))
    ));

    let balance: rust_decimal::Decimal =
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(100.00));

    let entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(entries, 0);
}

#[tokio::test]
async fn test_same_reference_applies_exactly_once() {
    let pool = common::setup_test_db().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let account = common::seed_account(
        &pool,
        "Mutator C",
        &format!("mutator-c-{}@test.example", suffix),
        dec!(100.00),
    )
    .await;

    let mutator = BalanceMutator::new(pool.clone());
    let reference = format!("TST-{}", Uuid::new_v4().simple());

    let first = mutator
        .apply_delta(&credit(account, "40.00", &reference))
        .await
        .unwrap();
    let second = mutator
        .apply_delta(&credit(account, "40.00", &reference))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.entry.id, second.entry.id);

    let balance: rust_decimal::Decimal =
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(140.00));

    let entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let pool = common::setup_test_db().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let account = common::seed_account(
        &pool,
        "Mutator D",
        &format!("mutator-d-{}@test.example", suffix),
        dec!(100.00),
    )
    .await;

    // 4 concurrent debits of 26.00 against 100.00: at most 3 can succeed
    let mut handles = Vec::new();
    for i in 0..4 {
        let mutator = BalanceMutator::new(pool.clone());
        let reference = format!("TST-{}-{}", Uuid::new_v4().simple(), i);
        handles.push(tokio::spawn(async move {
            mutator.apply_delta(&debit(account, "26.00", &reference)).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert!(successes <= 3, "overdraft: {} debits succeeded", successes);

    let balance: rust_decimal::Decimal =
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(balance >= dec!(0.00), "balance went negative: {}", balance);
    assert_eq!(balance, dec!(100.00) - dec!(26.00) * rust_decimal::Decimal::from(successes));
}

#[tokio::test]
async fn test_reverse_entry_compensates_and_marks_original() {
    let pool = common::setup_test_db().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let account = common::seed_account(
        &pool,
        "Mutator E",
        &format!("mutator-e-{}@test.example", suffix),
        dec!(100.00),
    )
    .await;

    let mutator = BalanceMutator::new(pool.clone());
    let reference = format!("TST-{}", Uuid::new_v4().simple());

    let original = mutator
        .apply_delta(&credit(account, "50.00", &reference))
        .await
        .unwrap();

    let reversal = mutator
        .reverse_entry(original.entry.id, "posted in error")
        .await
        .unwrap();

    assert_eq!(reversal.entry.entry_type, EntryType::Debit);
    assert_eq!(reversal.entry.amount, dec!(50.00));
    assert_eq!(reversal.entry.reference, format!("REV-{}", reference));

    let original_status: String =
        sqlx::query_scalar("SELECT status FROM ledger_entries WHERE id = $1")
            .bind(original.entry.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(original_status, "reversed");

    let balance: rust_decimal::Decimal =
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(account)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(100.00));

    // Reversing again is idempotent through the derived reference
    let replay = mutator
        .reverse_entry(original.entry.id, "posted in error")
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.entry.id, reversal.entry.id);
}
