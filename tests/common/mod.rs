//! Common test utilities

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{middleware, Router};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use bankcore::api::{self, AppState};
use bankcore::notify::{NotificationSender, NotifyError};

/// Schema applied before each test run (idempotent).
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Setup test database - apply schema, truncate tables, seed an API key
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    bankcore::db::verify_connection(&pool)
        .await
        .expect("DB connectivity check failed");

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .expect("Failed to apply schema");

    // Tests run concurrently in one binary: no truncation here, every test
    // works against accounts it seeded itself.

    // Compute hash dynamically to match what the middleware expects
    let hash_check: String =
        sqlx::query_scalar("SELECT encode(sha256('test_key_123'::bytea), 'hex')")
            .fetch_one(&pool)
            .await
            .unwrap();

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, key_prefix, permissions, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind("Test Key")
    .bind(&hash_check)
    .bind("test_")
    .bind(vec!["admin".to_string(), "adjust".to_string()])
    .bind(true)
    .execute(&pool)
    .await
    .expect("Failed to seed API key");

    pool
}

/// Seed an account directly with a known PIN and starting balance.
pub async fn seed_account(pool: &PgPool, name: &str, email: &str, balance: Decimal) -> Uuid {
    let account_id = Uuid::new_v4();
    let salt = bankcore::domain::otp::generate_salt();
    let pin_hash = bankcore::domain::otp::salted_sha256("1234", &salt);

    // 10-digit account number derived from the UUID for uniqueness
    let digits: String = account_id
        .simple()
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(9)
        .collect();
    let account_number = format!("9{:0<9}", digits);

    sqlx::query(
        r#"
        INSERT INTO accounts (
            id, account_number, holder_name, email, balance, status,
            kyc_approved, daily_transfer_limit, daily_withdrawal_limit,
            pin_hash, pin_salt, version
        )
        VALUES ($1, $2, $3, $4, $5, 'active', TRUE, 10000.00, 5000.00, $6, $7, 1)
        "#,
    )
    .bind(account_id)
    .bind(&account_number)
    .bind(name)
    .bind(email)
    .bind(balance)
    .bind(&pin_hash)
    .bind(&salt)
    .execute(pool)
    .await
    .expect("Failed to seed account");

    account_id
}

/// Look up the seeded account number for an account id.
pub async fn account_number_of(pool: &PgPool, account_id: Uuid) -> String {
    sqlx::query_scalar("SELECT account_number FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch account number")
}

/// Notification sender that records message bodies for inspection.
#[derive(Clone, Default)]
pub struct CapturingNotifier {
    pub messages: Arc<Mutex<Vec<(String, String, String)>>>,
}

#[async_trait]
impl NotificationSender for CapturingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

impl CapturingNotifier {
    /// Extract the 6-digit code from the most recent OTP message.
    pub fn last_otp_code(&self) -> Option<String> {
        let messages = self.messages.lock().unwrap();
        messages.iter().rev().find_map(|(_, _, body)| {
            body.split_whitespace()
                .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
                .map(|word| word.to_string())
        })
    }
}

/// Build the app router around a pool and a capturing notifier.
pub fn test_app(pool: PgPool, notifier: Arc<dyn NotificationSender>) -> Router {
    let state = AppState {
        pool: pool.clone(),
        notifier,
    };

    api::create_router()
        .layer(middleware::from_fn_with_state(
            pool,
            bankcore::api::middleware::auth_middleware,
        ))
        .with_state(state)
}
