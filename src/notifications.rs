use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Fixed payload handed to the notification collaborator after an admin
/// verification or rejection. Delivery mechanics live outside this core.
#[derive(Debug, Clone)]
pub struct LedgerNotification {
    pub event: String,
    pub recipient: Option<Uuid>,
    pub entity: String,
    pub transaction_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

/// key: notification-seam -> external dispatch collaborator
///
/// A dispatch failure must never roll back the committed state change that
/// triggered it; callers log and continue.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: LedgerNotification) -> Result<()>;
}

/// Default dispatcher: emits the payload as a structured log line.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, notification: LedgerNotification) -> Result<()> {
        tracing::info!(
            event = %notification.event,
            recipient = ?notification.recipient,
            entity = %notification.entity,
            transaction = %notification.transaction_id,
            amount_cents = notification.amount_cents,
            currency = %notification.currency,
            "ledger notification dispatched"
        );
        Ok(())
    }
}
