//! Notifier that writes events to the log.

use async_trait::async_trait;
use gym_core::notifier::{Notification, Notifier, NotifyError};

/// Default notifier: records each event as a structured `info` log line.
///
/// Real delivery (email, push) plugs in through the same [`Notifier`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = %notification.kind,
            reservation_id = %notification.related_entity_id,
            occurred_at = %notification.occurred_at,
            "Notification emitted"
        );
        Ok(())
    }
}
