//! Notifier doubles.

use async_trait::async_trait;
use gym_core::notifier::{Notification, NotificationKind, Notifier, NotifyError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// Captures every notification it receives.
///
/// The engine dispatches notifications on a spawned task, so assertions should go
/// through [`wait_for`](Self::wait_for) rather than reading the list right away.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
    arrived: Notify,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far, in arrival order
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds received so far, in arrival order
    #[must_use]
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications().iter().map(|n| n.kind).collect()
    }

    /// Wait until at least `count` notifications arrived or `timeout` passed.
    ///
    /// Returns whatever was received by then.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            let current = self.notifications();
            if current.len() >= count {
                return current;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.notifications();
            }
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        self.arrived.notify_waiters();
        Ok(())
    }
}

/// Rejects every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError(format!(
            "channel closed while sending {} to {}",
            notification.kind, notification.user_id
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_clock;
    use gym_core::environment::Clock;
    use gym_core::types::{ReservationId, UserId};
    use std::sync::Arc;

    fn notification(kind: NotificationKind) -> Notification {
        Notification::new(UserId::new(), kind, ReservationId::new(), test_clock().now())
    }

    #[tokio::test]
    async fn test_wait_for_sees_spawned_notifications() {
        let recorder = Arc::new(RecordingNotifier::new());
        let sender = Arc::clone(&recorder);
        tokio::spawn(async move {
            sender
                .notify(notification(NotificationKind::ReservationConfirmed))
                .await
                .unwrap();
            sender
                .notify(notification(NotificationKind::ReservationCancelled))
                .await
                .unwrap();
        });

        let got = recorder.wait_for(2, Duration::from_secs(1)).await;
        assert_eq!(got.len(), 2);
        assert_eq!(
            recorder.kinds(),
            vec![
                NotificationKind::ReservationConfirmed,
                NotificationKind::ReservationCancelled
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_gives_up_after_timeout() {
        let recorder = RecordingNotifier::new();
        let got = recorder.wait_for(1, Duration::from_millis(20)).await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_failing_notifier_rejects() {
        let result = FailingNotifier
            .notify(notification(NotificationKind::MarkedMissed))
            .await;
        assert!(result.unwrap_err().to_string().contains("marked_missed"));
    }
}
