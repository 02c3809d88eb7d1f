//! Outbound notifications.
//!
//! Events are handed to a [`Notifier`] on a spawned task. Delivery failures are logged
//! and never reach the request that raised the event.

use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use crate::domain::events::DomainEvent;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish failed: {0}")]
    Publish(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError>;
}

/// Publishes each event as JSON on `<prefix>.<routing key>`, e.g. `ecommerce.order.confirmed`.
/// A mailer service subscribes there and sends the customer and admin emails.
pub struct NatsNotifier {
    client: async_nats::Client,
    prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject(&self, event: &DomainEvent) -> String {
        format!("{}.{}", self.prefix, event.routing_key())
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject(event), payload.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))
    }
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        info!(routing_key = event.routing_key(), %payload, "notification");
        Ok(())
    }
}

/// Fire and forget.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: DomainEvent) {
    tokio::spawn(async move {
        if let Err(e) = notifier.publish(&event).await {
            warn!(routing_key = event.routing_key(), error = %e, "notification failed");
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Forwards every event to a channel so tests can await delivery.
    pub struct ChannelNotifier(pub mpsc::UnboundedSender<DomainEvent>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
            self.0.send(event.clone()).map_err(|e| NotifyError::Publish(e.to_string()))
        }
    }

    /// Records each attempt, then fails it.
    struct FailingNotifier(mpsc::UnboundedSender<DomainEvent>);

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
            let _ = self.0.send(event.clone());
            Err(NotifyError::Publish("broker down".into()))
        }
    }

    fn event() -> DomainEvent {
        DomainEvent::Inventory(crate::domain::events::InventoryEvent::LowStock {
            admin_email: "admin@example.com".into(),
            threshold: 10,
            products: vec![],
        })
    }

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatch(Arc::new(ChannelNotifier(tx)), event());
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got, Some(event()));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let (attempts_tx, mut attempts) = mpsc::unbounded_channel();
        dispatch(Arc::new(FailingNotifier(attempts_tx)), event());
        let attempted = tokio::time::timeout(Duration::from_secs(1), attempts.recv()).await.unwrap();
        assert_eq!(attempted, Some(event()));

        // The failed publish neither panics the runtime nor blocks later deliveries.
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatch(Arc::new(ChannelNotifier(tx)), event());
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got, Some(event()));
    }

    #[test]
    fn test_event_payload_shape() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["event"], "inventory");
        assert_eq!(json["kind"], "low_stock");
        assert_eq!(json["threshold"], 10);
    }
}
