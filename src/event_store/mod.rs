// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! The engine does not decide how events are stored; it only requires an
//! append-only log, ordered per aggregate. [`InMemoryEventStore`] satisfies
//! the contract for a single process and for tests.
//!
//! # Event Store Requirements
//!
//! 1. **Append-Only**: Events are never updated or deleted
//! 2. **Ordered**: Events maintain sequence within aggregate
//! 3. **Correlation**: Events track causation chains
//! 4. **Replay**: Support reconstructing state from events

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EngineResult;
use crate::events::ResourceEvent;

pub mod memory;

pub use memory::InMemoryEventStore;

/// Stored event envelope with sequencing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event ID
    pub event_id: Uuid,

    /// Aggregate ID this event belongs to
    pub aggregate_id: Uuid,

    /// Sequence number within the aggregate stream, starting at 1
    pub sequence: u64,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Correlation ID (tracks related events across aggregates)
    pub correlation_id: Uuid,

    /// Causation ID (immediate cause of this event)
    pub causation_id: Option<Uuid>,

    /// The event payload
    pub data: ResourceEvent,
}

impl StoredEvent {
    pub fn new(event: ResourceEvent, sequence: u64) -> Self {
        Self {
            event_id: event.event_id(),
            aggregate_id: event.aggregate_id(),
            sequence,
            timestamp: event.timestamp(),
            correlation_id: event.correlation_id(),
            causation_id: event.causation_id(),
            data: event,
        }
    }
}

/// Event Store trait for persisting and retrieving domain events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate's event stream
    ///
    /// Events are written atomically. When `expected_version` is given it
    /// must equal the stream's current version, otherwise the append fails
    /// with `EngineError::Conflict`.
    ///
    /// Returns the new version after appending.
    async fn append(
        &self,
        aggregate_id: Uuid,
        events: Vec<ResourceEvent>,
        expected_version: Option<u64>,
    ) -> EngineResult<u64>;

    /// Read all events for an aggregate in the order they were written
    async fn read_events(&self, aggregate_id: Uuid) -> EngineResult<Vec<StoredEvent>>;

    /// Read events for an aggregate starting at `from_version` (inclusive)
    async fn read_events_from(
        &self,
        aggregate_id: Uuid,
        from_version: u64,
    ) -> EngineResult<Vec<StoredEvent>>;

    /// Read all events sharing a correlation ID, across aggregates
    async fn read_by_correlation(&self, correlation_id: Uuid) -> EngineResult<Vec<StoredEvent>>;

    /// Current version of an aggregate, or None if it has no events
    async fn get_version(&self, aggregate_id: Uuid) -> EngineResult<Option<u64>>;
}
