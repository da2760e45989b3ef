//! # Notification Sink
//!
//! Best-effort delivery of committed events.
//!
//! ```text
//! UnitOfWork outbox ──commit──► Vec<Notification> ──► NotificationSink::emit
//!                   ──rollback─► dropped                 │
//!                                                        ├─ BroadcastHub  (subscribers)
//!                                                        └─ TracingSink   (log only)
//! ```
//!
//! `emit` cannot fail: a sink that loses an event logs it and moves on, it
//! never reaches back into the business transaction.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use comanda_core::Notification;

pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: &Notification);
}

/// In-process fan-out over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastHub { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for BroadcastHub {
    fn emit(&self, notification: &Notification) {
        match self.sender.send(notification.clone()) {
            Ok(receivers) => {
                debug!(event = %notification.event, tenant_id = %notification.tenant_id, receivers, "Notification broadcast");
            }
            Err(_) => {
                debug!(event = %notification.event, "No subscribers, notification dropped");
            }
        }
    }
}

/// Logs every event; used when nothing subscribes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, notification: &Notification) {
        info!(
            event = %notification.event,
            tenant_id = %notification.tenant_id,
            payload = %notification.payload,
            "Notification"
        );
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        FanOut::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanOut {
    fn emit(&self, notification: &Notification) {
        for sink in &self.sinks {
            sink.emit(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comanda_core::event::TABLE_STATE;
    use serde_json::json;

    #[tokio::test]
    async fn test_hub_fans_out_to_subscribers() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.emit(&Notification::new(TABLE_STATE, "t1", json!({"mesaId": "m1"})));

        assert_eq!(a.recv().await.unwrap().event, TABLE_STATE);
        assert_eq!(b.recv().await.unwrap().tenant_id, "t1");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let hub = BroadcastHub::new(1);
        hub.emit(&Notification::new(TABLE_STATE, "t1", json!({})));
        TracingSink.emit(&Notification::new(TABLE_STATE, "t1", json!({})));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_sink() {
        let hub = BroadcastHub::new(4);
        let mut rx = hub.subscribe();
        let sink = FanOut::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(hub.clone()));

        sink.emit(&Notification::new(TABLE_STATE, "t1", json!({})));

        assert_eq!(rx.recv().await.unwrap().event, TABLE_STATE);
    }
}
