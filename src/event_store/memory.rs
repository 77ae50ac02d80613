// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process event store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{EventStore, StoredEvent};
use crate::errors::{EngineError, EngineResult};
use crate::events::ResourceEvent;

/// Event store holding every stream in memory
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<Uuid, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams
    pub async fn len(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        events: Vec<ResourceEvent>,
        expected_version: Option<u64>,
    ) -> EngineResult<u64> {
        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id).or_default();
        let current = stream.len() as u64;

        if let Some(expected) = expected_version {
            if expected != current {
                return Err(EngineError::Conflict(format!(
                    "aggregate {} expected version {}, found {}",
                    aggregate_id, expected, current
                )));
            }
        }

        if let Some(foreign) = events.iter().find(|e| e.aggregate_id() != aggregate_id) {
            return Err(EngineError::internal(format!(
                "event {} belongs to aggregate {}, not {}",
                foreign.event_id(),
                foreign.aggregate_id(),
                aggregate_id
            )));
        }

        let count = events.len();
        for (offset, event) in events.into_iter().enumerate() {
            stream.push(StoredEvent::new(event, current + offset as u64 + 1));
        }

        let version = stream.len() as u64;
        debug!(%aggregate_id, appended = count, version, "appended events");
        Ok(version)
    }

    async fn read_events(&self, aggregate_id: Uuid) -> EngineResult<Vec<StoredEvent>> {
        Ok(self
            .streams
            .read()
            .await
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_events_from(
        &self,
        aggregate_id: Uuid,
        from_version: u64,
    ) -> EngineResult<Vec<StoredEvent>> {
        Ok(self
            .read_events(aggregate_id)
            .await?
            .into_iter()
            .filter(|e| e.sequence >= from_version)
            .collect())
    }

    async fn read_by_correlation(&self, correlation_id: Uuid) -> EngineResult<Vec<StoredEvent>> {
        let streams = self.streams.read().await;
        let mut events: Vec<StoredEvent> = streams
            .values()
            .flatten()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.event_id));
        Ok(events)
    }

    async fn get_version(&self, aggregate_id: Uuid) -> EngineResult<Option<u64>> {
        Ok(self
            .streams
            .read()
            .await
            .get(&aggregate_id)
            .filter(|stream| !stream.is_empty())
            .map(|stream| stream.len() as u64))
    }
}
