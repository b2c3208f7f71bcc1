//! Notification dispatch
//!
//! Fire-and-forget delivery of human-readable confirmations and one-time
//! codes. Actual transport (email, SMS) is an external collaborator behind
//! the `NotificationSender` trait; failures are absorbed and logged here,
//! never surfaced as a failure of the financial operation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Amount;

/// Notification delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification boundary: `send(to, subject, body)`.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Default sender that records notifications in the log stream.
///
/// Stands in for a real mail provider in development and tests.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationSender for LoggingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(to = %to, subject = %subject, body = %body, "Notification sent");
        Ok(())
    }
}

/// A composed message ready for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// One-time code delivery for a pending transfer.
    pub fn transfer_otp(to: &str, code: &str, amount: &Amount, recipient: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your transfer verification code".to_string(),
            body: format!(
                "Use code {} to authorize your transfer of {} to {}. \
                 The code expires in 10 minutes.",
                code, amount, recipient
            ),
        }
    }

    /// Debit confirmation after a committed transfer.
    pub fn transfer_receipt(to: &str, amount: &Amount, recipient: &str, reference: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Transfer completed".to_string(),
            body: format!(
                "Your transfer of {} to {} has been completed. Reference: {}.",
                amount, recipient, reference
            ),
        }
    }

    /// Credit or debit alert after a manual adjustment.
    pub fn adjustment_notice(to: &str, kind: &str, amount: &Amount, new_balance: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{} alert", if kind == "credit" { "Credit" } else { "Debit" }),
            body: format!(
                "A {} of {} was applied to your account. New balance: {}.",
                kind, amount, new_balance
            ),
        }
    }
}

/// Dispatch a notification without blocking the caller.
///
/// Runs in a detached task; a slow or failing provider cannot stall or fail
/// the financial operation that triggered it.
pub fn dispatch(sender: Arc<dyn NotificationSender>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = sender
            .send(&notification.to, &notification.subject, &notification.body)
            .await
        {
            tracing::warn!(
                to = %notification.to,
                subject = %notification.subject,
                error = %e,
                "Notification delivery failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl NotificationSender for CountingNotifier {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl NotificationSender for FailingNotifier {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("provider unavailable".to_string()))
        }
    }

    #[test]
    fn test_otp_message_contains_code_and_amount() {
        let amount = Amount::new(dec!(200.00)).unwrap();
        let note = Notification::transfer_otp("alice@example.com", "123456", &amount, "account 42");

        assert!(note.body.contains("123456"));
        assert!(note.body.contains("200.00"));
        assert!(note.body.contains("10 minutes"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let sender = Arc::new(CountingNotifier(AtomicUsize::new(0)));
        let amount = Amount::new(dec!(10.00)).unwrap();

        dispatch(
            sender.clone(),
            Notification::transfer_receipt("bob@example.com", &amount, "account 7", "TRF-1"),
        );

        // Let the detached task run
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(sender.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_absorbs_failures() {
        let amount = Amount::new(dec!(10.00)).unwrap();

        // Must not panic or propagate anywhere
        dispatch(
            Arc::new(FailingNotifier),
            Notification::adjustment_notice("bob@example.com", "debit", &amount, "90.00"),
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
