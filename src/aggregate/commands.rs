// Copyright (c) 2025 - Cowboy AI, Inc.
//! Commands for the Resource Aggregate
//!
//! Commands express intent and can fail validation. Events express facts.
//!
//! # Time Handling
//!
//! All commands carry an explicit `timestamp`. Handlers never read the clock;
//! the service layer obtains time from its injected [`Clock`](crate::clock::Clock).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::aggregate::PatchPolicy;
use crate::meta::MetaTable;
use crate::privilege::{CallerIdentity, PrivilegeMap};
use crate::session::SessionLease;

/// Header attached to every resource unless overridden
pub const ODATA_VERSION_HEADER: (&str, &str) = ("OData-Version", "4.0");

/// Create a resource or collection
///
/// The meta table is not part of the resulting event: descriptors hold
/// functions and live beside the aggregate in the store. Their capability
/// entries are written into the initial properties.
#[derive(Debug, Clone)]
pub struct CreateResourceCommand {
    pub uri: String,
    pub resource_type: String,
    pub context: String,
    pub collection: bool,
    pub properties: Map<String, Value>,
    pub privileges: PrivilegeMap,
    pub headers: BTreeMap<String, String>,
    pub writable: BTreeSet<String>,
    pub patch_policy: PatchPolicy,
    pub session: Option<SessionLease>,
    pub meta: MetaTable,

    /// Timestamp when command was issued
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for distributed tracing
    pub correlation_id: Uuid,
}

impl CreateResourceCommand {
    pub fn new(
        uri: impl Into<String>,
        resource_type: impl Into<String>,
        context: impl Into<String>,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            ODATA_VERSION_HEADER.0.to_string(),
            ODATA_VERSION_HEADER.1.to_string(),
        );

        Self {
            uri: uri.into(),
            resource_type: resource_type.into(),
            context: context.into(),
            collection: false,
            properties: Map::new(),
            privileges: PrivilegeMap::new(),
            headers,
            writable: BTreeSet::new(),
            patch_policy: PatchPolicy::default(),
            session: None,
            meta: MetaTable::new(),
            timestamp,
            correlation_id,
        }
    }

    /// Initial properties from a JSON object; non-objects are ignored
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties.extend(map);
        }
        self
    }

    pub fn with_privileges(mut self, privileges: PrivilegeMap) -> Self {
        self.privileges = privileges;
        self
    }

    pub fn with_meta(mut self, meta: MetaTable) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Properties a client may write without a setter
    pub fn writable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_patch_policy(mut self, policy: PatchPolicy) -> Self {
        self.patch_policy = policy;
        self
    }

    pub fn as_collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn with_session(mut self, lease: SessionLease) -> Self {
        self.session = Some(lease);
        self
    }
}

/// Client write of one or more properties
#[derive(Debug, Clone, PartialEq)]
pub struct PatchCommand {
    pub body: Map<String, Value>,
    pub caller: CallerIdentity,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

/// Remove a resource from the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    pub caller: CallerIdentity,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

/// Append a member to a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMemberCommand {
    pub member_id: Uuid,
    pub member_uri: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,

    /// Event that caused this command (the member's creation)
    pub causation_id: Option<Uuid>,
}

/// Drop a member from a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveMemberCommand {
    pub member_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
}

/// Raw property write by a trusted in-process producer
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePropertiesCommand {
    pub properties: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

/// Extend a session's idle window after a token validated against it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSessionCommand {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}
