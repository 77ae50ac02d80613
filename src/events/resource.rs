// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Domain Events
//!
//! Every state change to a resource aggregate is one of these immutable facts.
//! Payload structs carry the common envelope fields (version, ids, timestamp,
//! correlation/causation) followed by the event-specific data.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::aggregate::PatchPolicy;
use crate::privilege::PrivilegeMap;
use crate::session::SessionLease;

/// Resource Domain Events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceEvent {
    /// Aggregate was created with its initial properties and privileges
    ResourceCreated(ResourceCreated),

    /// One property received a new raw value
    PropertyChanged(PropertyChanged),

    /// A member was appended to a collection
    CollectionMemberAdded(CollectionMemberAdded),

    /// A member was dropped from a collection
    CollectionMemberRemoved(CollectionMemberRemoved),

    /// Aggregate was removed from the resource tree
    ResourceRemoved(ResourceRemoved),

    /// A token bound to this session was validated
    SessionTokenRefreshed(SessionTokenRefreshed),
}

/// Resource was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCreated {
    /// Event version for schema evolution
    pub event_version: u32,

    /// Unique event identifier (UUID v7 for time ordering)
    pub event_id: Uuid,

    /// Resource aggregate ID
    pub aggregate_id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for request tracing
    pub correlation_id: Uuid,

    /// Causation ID (event that caused this event)
    pub causation_id: Option<Uuid>,

    /// Resource path, e.g. `/redfish/v1/Chassis/1`
    pub resource_uri: String,

    /// `@odata.type`
    pub resource_type: String,

    /// `@odata.context`
    pub context: String,

    /// Whether the resource is a collection
    pub collection: bool,

    /// Initial raw properties, including `X@meta` capability entries
    pub properties: Map<String, Value>,

    /// Verb → privilege requirement
    pub privileges: PrivilegeMap,

    /// Headers attached to every response for this resource
    pub headers: BTreeMap<String, String>,

    /// Properties accepting raw writes without a registered setter
    pub writable: BTreeSet<String>,

    /// PATCH semantics for this resource
    pub patch_policy: PatchPolicy,

    /// Present when the resource is a login session
    pub session: Option<SessionLease>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChanged {
    pub event_version: u32,
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    /// Property that changed
    pub property: String,

    /// New raw value
    pub value: Value,

    /// Raw value before the change, if any
    pub previous: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMemberAdded {
    pub event_version: u32,
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    /// Aggregate ID of the new member
    pub member_id: Uuid,

    /// URI of the new member
    pub member_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMemberRemoved {
    pub event_version: u32,
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    pub member_id: Uuid,
    pub member_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRemoved {
    pub event_version: u32,
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    /// URI the resource occupied
    pub resource_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokenRefreshed {
    pub event_version: u32,
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    /// Session whose idle window was extended
    pub session_uri: String,
}

impl ResourceCreated {
    pub const CURRENT_VERSION: u32 = 1;
}

impl PropertyChanged {
    pub const CURRENT_VERSION: u32 = 1;
}

impl CollectionMemberAdded {
    pub const CURRENT_VERSION: u32 = 1;
}

impl CollectionMemberRemoved {
    pub const CURRENT_VERSION: u32 = 1;
}

impl ResourceRemoved {
    pub const CURRENT_VERSION: u32 = 1;
}

impl SessionTokenRefreshed {
    pub const CURRENT_VERSION: u32 = 1;
}

impl ResourceEvent {
    /// Extract aggregate ID from any event
    pub fn aggregate_id(&self) -> Uuid {
        use ResourceEvent::*;

        match self {
            ResourceCreated(e) => e.aggregate_id,
            PropertyChanged(e) => e.aggregate_id,
            CollectionMemberAdded(e) => e.aggregate_id,
            CollectionMemberRemoved(e) => e.aggregate_id,
            ResourceRemoved(e) => e.aggregate_id,
            SessionTokenRefreshed(e) => e.aggregate_id,
        }
    }

    pub fn event_id(&self) -> Uuid {
        use ResourceEvent::*;

        match self {
            ResourceCreated(e) => e.event_id,
            PropertyChanged(e) => e.event_id,
            CollectionMemberAdded(e) => e.event_id,
            CollectionMemberRemoved(e) => e.event_id,
            ResourceRemoved(e) => e.event_id,
            SessionTokenRefreshed(e) => e.event_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        use ResourceEvent::*;

        match self {
            ResourceCreated(e) => e.timestamp,
            PropertyChanged(e) => e.timestamp,
            CollectionMemberAdded(e) => e.timestamp,
            CollectionMemberRemoved(e) => e.timestamp,
            ResourceRemoved(e) => e.timestamp,
            SessionTokenRefreshed(e) => e.timestamp,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        use ResourceEvent::*;

        match self {
            ResourceCreated(e) => e.correlation_id,
            PropertyChanged(e) => e.correlation_id,
            CollectionMemberAdded(e) => e.correlation_id,
            CollectionMemberRemoved(e) => e.correlation_id,
            ResourceRemoved(e) => e.correlation_id,
            SessionTokenRefreshed(e) => e.correlation_id,
        }
    }

    pub fn causation_id(&self) -> Option<Uuid> {
        use ResourceEvent::*;

        match self {
            ResourceCreated(e) => e.causation_id,
            PropertyChanged(e) => e.causation_id,
            CollectionMemberAdded(e) => e.causation_id,
            CollectionMemberRemoved(e) => e.causation_id,
            ResourceRemoved(e) => e.causation_id,
            SessionTokenRefreshed(e) => e.causation_id,
        }
    }

    /// Human-readable event type name
    pub fn event_type_name(&self) -> &'static str {
        use ResourceEvent::*;

        match self {
            ResourceCreated(_) => "ResourceCreated",
            PropertyChanged(_) => "PropertyChanged",
            CollectionMemberAdded(_) => "CollectionMemberAdded",
            CollectionMemberRemoved(_) => "CollectionMemberRemoved",
            ResourceRemoved(_) => "ResourceRemoved",
            SessionTokenRefreshed(_) => "SessionTokenRefreshed",
        }
    }

    /// Decode a stored payload, returning `None` for event types this build
    /// does not recognize
    pub fn decode(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unrecognized event payload");
                None
            }
        }
    }
}
