// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS-backed event bus

use std::time::Duration;

use async_nats::{Client, ConnectOptions, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info};

use super::EventBus;
use crate::errors::{EngineError, EngineResult};
use crate::events::ResourceEvent;
use crate::subjects::SubjectBuilder;

/// Configuration for NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-redfish".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Publishes every committed event on `redfish.{operation}.{aggregate_id}`
#[derive(Clone)]
pub struct NatsEventBus {
    client: Client,
}

impl NatsEventBus {
    pub async fn connect(config: NatsConfig) -> EngineResult<Self> {
        let options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout);

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| EngineError::internal(format!("NATS connection error: {}", e)))?;

        info!("Connected to NATS at {:?}", config.servers);
        Ok(Self { client })
    }

    /// Subscribe to raw event payloads on a subject pattern
    pub async fn subscribe(&self, subject: &str) -> EngineResult<Subscriber> {
        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| EngineError::internal(format!("NATS subscribe error: {}", e)))
    }

    /// Decode events from a subscription, skipping payloads this build does
    /// not recognize
    pub async fn next_event(subscriber: &mut Subscriber) -> Option<ResourceEvent> {
        while let Some(msg) = subscriber.next().await {
            match serde_json::from_slice::<serde_json::Value>(&msg.payload) {
                Ok(payload) => {
                    if let Some(event) = ResourceEvent::decode(payload) {
                        return Some(event);
                    }
                }
                Err(e) => error!("Failed to deserialize message on {}: {}", msg.subject, e),
            }
        }
        None
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: &ResourceEvent) -> EngineResult<()> {
        let subject = SubjectBuilder::for_event(event);
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| EngineError::internal(format!("NATS publish error: {}", e)))?;

        debug!("Published {} to subject: {}", event.event_type_name(), subject);
        Ok(())
    }
}
