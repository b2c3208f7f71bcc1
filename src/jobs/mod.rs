//! Scheduled Jobs
//!
//! Periodic maintenance. Expiry of one-time codes is always enforced at
//! verification time; the janitor here only transitions stale transfer
//! requests to `expired` so the audit trail reflects reality.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

/// Transition stale transfer requests to `expired`.
///
/// Covers `otp_sent` requests whose challenge window has passed and
/// `pending` requests that never progressed within 24 hours.
pub async fn expire_stale_transfers(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        UPDATE transfer_requests
        SET status = 'expired', updated_at = NOW()
        WHERE (status = 'otp_sent' AND otp_expires_at < NOW())
           OR (status = 'pending' AND created_at < NOW() - INTERVAL '24 hours')
        "#,
    )
    .execute(pool)
    .await?;

    let rows_affected = result.rows_affected();

    if rows_affected > 0 {
        tracing::info!(
            rows_affected = rows_affected,
            "Expired stale transfer requests"
        );
    }

    Ok(rows_affected)
}

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for transfer expiry sweep (default: 1 minute)
    pub transfer_expiry_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            transfer_expiry_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background.
    /// Returns a handle that can be used to abort the scheduler.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut expiry_interval = interval(self.config.transfer_expiry_interval);

        loop {
            expiry_interval.tick().await;
            if let Err(e) = expire_stale_transfers(&self.pool).await {
                tracing::error!(error = %e, "Transfer expiry sweep failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match expire_stale_transfers(&self.pool).await {
            Ok(count) => report.transfers_expired = count,
            Err(e) => report.errors.push(format!("Transfer expiry: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub transfers_expired: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.transfer_expiry_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.transfers_expired, 0);
        assert_eq!(report.errors.len(), 0);
    }
}
