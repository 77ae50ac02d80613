// Copyright (c) 2025 - Cowboy AI, Inc.

//! Subject hierarchy for published resource events
//!
//! # Subject Pattern
//!
//! ```text
//! redfish.{operation}.{aggregate_id}
//! ```
//!
//! This allows for:
//! - Precise subscriptions (`redfish.property_changed.<id>`)
//! - Operation-level wildcards (`redfish.property_changed.>`)
//! - Global subscriptions (`redfish.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_redfish::subjects::{Operation, SubjectBuilder};
//!
//! let wildcard = SubjectBuilder::new()
//!     .operation(Operation::Removed)
//!     .build();
//! assert_eq!(wildcard, "redfish.removed.>");
//! ```

use std::fmt;

use uuid::Uuid;

use crate::events::ResourceEvent;

/// Root namespace for all resource subjects
pub const REDFISH_ROOT: &str = "redfish";

/// Event operations, one per published event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Created,
    PropertyChanged,
    MemberAdded,
    MemberRemoved,
    Removed,
    TokenRefreshed,
}

impl Operation {
    pub fn of(event: &ResourceEvent) -> Self {
        match event {
            ResourceEvent::ResourceCreated(_) => Operation::Created,
            ResourceEvent::PropertyChanged(_) => Operation::PropertyChanged,
            ResourceEvent::CollectionMemberAdded(_) => Operation::MemberAdded,
            ResourceEvent::CollectionMemberRemoved(_) => Operation::MemberRemoved,
            ResourceEvent::ResourceRemoved(_) => Operation::Removed,
            ResourceEvent::SessionTokenRefreshed(_) => Operation::TokenRefreshed,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Created => write!(f, "created"),
            Operation::PropertyChanged => write!(f, "property_changed"),
            Operation::MemberAdded => write!(f, "member_added"),
            Operation::MemberRemoved => write!(f, "member_removed"),
            Operation::Removed => write!(f, "removed"),
            Operation::TokenRefreshed => write!(f, "token_refreshed"),
        }
    }
}

/// Builder for resource event subjects
///
/// Missing segments become wildcards.
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    operation: Option<Operation>,
    aggregate_id: Option<Uuid>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject a given event is published on
    pub fn for_event(event: &ResourceEvent) -> String {
        Self::new()
            .operation(Operation::of(event))
            .aggregate(event.aggregate_id())
            .build()
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn aggregate(mut self, aggregate_id: Uuid) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn build(self) -> String {
        match (self.operation, self.aggregate_id) {
            (Some(op), Some(id)) => format!("{}.{}.{}", REDFISH_ROOT, op, id),
            (Some(op), None) => format!("{}.{}.>", REDFISH_ROOT, op),
            (None, Some(id)) => format!("{}.*.{}", REDFISH_ROOT, id),
            (None, None) => Self::build_all(),
        }
    }

    /// Subscription for every resource event: `redfish.>`
    pub fn build_all() -> String {
        format!("{}.>", REDFISH_ROOT)
    }
}
