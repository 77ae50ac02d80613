// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Functional Resource Aggregate
//!
//! One aggregate per addressable resource. State is never mutated in place;
//! it is the left fold of the resource's event stream:
//!
//! ```text
//! Events → apply_event() → ResourceState
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::events::ResourceEvent;
use crate::privilege::PrivilegeMap;
use crate::session::SessionLease;

/// How a PATCH body with some invalid fields is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchPolicy {
    /// Valid fields are applied; invalid ones are reported individually
    #[default]
    PartialSuccess,
    /// Any invalid field rejects the whole body
    AllOrNothing,
}

/// Reference to a collection member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: Uuid,
    pub uri: String,
}

/// Tombstone left by a `ResourceRemoved` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub at: DateTime<Utc>,
    /// Correlation id of the command that removed the resource
    pub correlation_id: Uuid,
}

/// Immutable resource state
///
/// Reconstructed from events; all fields are public for read access.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    /// Aggregate ID
    pub id: Uuid,

    /// Resource path
    pub uri: String,

    /// `@odata.type`
    pub resource_type: String,

    /// `@odata.context`
    pub context: String,

    /// Number of events applied
    pub version: u64,

    /// Raw stored property values, including `X@meta` entries
    pub properties: Map<String, Value>,

    /// Verb → required privileges
    pub privileges: PrivilegeMap,

    /// Headers attached to every response
    pub headers: BTreeMap<String, String>,

    /// Properties a client may write without a registered setter
    pub writable: BTreeSet<String>,

    pub patch_policy: PatchPolicy,

    pub collection: bool,

    /// Collection members in append order
    pub members: Vec<MemberRef>,

    /// Login session data, for session resources
    pub session: Option<SessionLease>,

    pub removed: Option<Removal>,

    /// When this aggregate was created (first event timestamp)
    pub created_at: Option<DateTime<Utc>>,

    /// When this aggregate was last modified (latest event timestamp)
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceState {
    /// Initial state for event folding
    pub fn default_for(id: Uuid) -> Self {
        Self {
            id,
            uri: String::new(),
            resource_type: String::new(),
            context: String::new(),
            version: 0,
            properties: Map::new(),
            privileges: PrivilegeMap::new(),
            headers: BTreeMap::new(),
            writable: BTreeSet::new(),
            patch_policy: PatchPolicy::default(),
            collection: false,
            members: Vec::new(),
            session: None,
            removed: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Reconstruct state from an event stream
    ///
    /// ```text
    /// State = fold(Events, InitialState, apply_event)
    /// ```
    pub fn from_events(events: &[ResourceEvent]) -> Self {
        let aggregate_id = events
            .first()
            .map(|e| e.aggregate_id())
            .unwrap_or_else(Uuid::now_v7);

        events
            .iter()
            .fold(Self::default_for(aggregate_id), apply_event)
    }

    pub fn is_initialized(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.is_some()
    }

    /// Initialized and not removed
    pub fn is_live(&self) -> bool {
        self.is_initialized() && !self.is_removed()
    }

    pub fn has_member(&self, member_id: Uuid) -> bool {
        self.members.iter().any(|m| m.id == member_id)
    }
}

/// Apply one event to state
///
/// Total and deterministic: every event has a defined effect, and an event for
/// a different aggregate leaves state untouched.
pub fn apply_event(state: ResourceState, event: &ResourceEvent) -> ResourceState {
    use ResourceEvent::*;

    if state.is_initialized() && event.aggregate_id() != state.id {
        return state;
    }

    let version = state.version + 1;

    match event {
        ResourceCreated(e) => ResourceState {
            id: e.aggregate_id,
            uri: e.resource_uri.clone(),
            resource_type: e.resource_type.clone(),
            context: e.context.clone(),
            version,
            properties: e.properties.clone(),
            privileges: e.privileges.clone(),
            headers: e.headers.clone(),
            writable: e.writable.clone(),
            patch_policy: e.patch_policy,
            collection: e.collection,
            members: Vec::new(),
            session: e.session.clone(),
            removed: None,
            created_at: Some(e.timestamp),
            updated_at: Some(e.timestamp),
        },

        PropertyChanged(e) => {
            let mut properties = state.properties;
            properties.insert(e.property.clone(), e.value.clone());
            ResourceState {
                properties,
                version,
                updated_at: Some(e.timestamp),
                ..state
            }
        }

        CollectionMemberAdded(e) => {
            let mut members = state.members;
            if !members.iter().any(|m| m.id == e.member_id) {
                members.push(MemberRef {
                    id: e.member_id,
                    uri: e.member_uri.clone(),
                });
            }
            ResourceState {
                members,
                version,
                updated_at: Some(e.timestamp),
                ..state
            }
        }

        CollectionMemberRemoved(e) => {
            let mut members = state.members;
            members.retain(|m| m.id != e.member_id);
            ResourceState {
                members,
                version,
                updated_at: Some(e.timestamp),
                ..state
            }
        }

        ResourceRemoved(e) => ResourceState {
            removed: Some(Removal {
                at: e.timestamp,
                correlation_id: e.correlation_id,
            }),
            version,
            updated_at: Some(e.timestamp),
            ..state
        },

        SessionTokenRefreshed(e) => {
            let session = state.session.map(|lease| SessionLease {
                last_refreshed: e.timestamp,
                ..lease
            });
            ResourceState {
                session,
                version,
                updated_at: Some(e.timestamp),
                ..state
            }
        }
    }
}
