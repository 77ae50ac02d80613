// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Bus
//!
//! Committed events are published to observers such as projections and
//! audit logs. Publication happens after the event store append; a failed
//! publish is logged and never rolls back the commit.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::errors::EngineResult;
use crate::events::ResourceEvent;

#[cfg(feature = "nats")]
pub mod nats;

#[cfg(feature = "nats")]
pub use nats::{NatsConfig, NatsEventBus};

/// Ordered delivery of committed events to subscribers
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event
    async fn publish(&self, event: &ResourceEvent) -> EngineResult<()>;

    /// Publish events in order, stopping at the first failure
    async fn publish_all(&self, events: &[ResourceEvent]) -> EngineResult<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Publish events that are already committed
///
/// Failures are logged; the events stay committed.
pub async fn publish_committed(bus: &dyn EventBus, events: &[ResourceEvent]) {
    if let Err(err) = bus.publish_all(events).await {
        warn!(error = %err, count = events.len(), "failed to publish committed events");
    }
}

/// In-process bus backed by a tokio broadcast channel
///
/// Subscribers that fall behind by more than `capacity` events observe a
/// `Lagged` error from their receiver and skip ahead.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ResourceEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &ResourceEvent) -> EngineResult<()> {
        // No subscribers is not an error
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        trace!(
            event_type = event.event_type_name(),
            aggregate_id = %event.aggregate_id(),
            receivers,
            "published event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionTokenRefreshed;
    use chrono::Utc;
    use uuid::Uuid;

    fn refreshed() -> ResourceEvent {
        ResourceEvent::SessionTokenRefreshed(SessionTokenRefreshed {
            event_version: SessionTokenRefreshed::CURRENT_VERSION,
            event_id: Uuid::now_v7(),
            aggregate_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id: Uuid::now_v7(),
            causation_id: None,
            session_uri: "/redfish/v1/SessionService/Sessions/abc".to_string(),
        })
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = InMemoryEventBus::new(8);
        let mut rx = bus.subscribe();
        let first = refreshed();
        let second = refreshed();

        bus.publish_all(&[first.clone(), second.clone()]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let bus = InMemoryEventBus::default();
        assert!(bus.publish(&refreshed()).await.is_ok());
    }
}
