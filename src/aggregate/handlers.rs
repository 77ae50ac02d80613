// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Command Handlers for the Resource Aggregate
//!
//! ```text
//! handle_command(State, Command) → Result<Event(s), CommandError>
//! ```
//!
//! Handlers perform no I/O and never read the clock. They see a snapshot of
//! state; the store serializes writers per aggregate, so the snapshot is
//! current for the duration of one command. Privilege checks against the
//! resource-level map happen before a handler runs; property-level overrides
//! are checked here because they depend on the body.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::aggregate::commands::*;
use crate::aggregate::resource::{PatchPolicy, ResourceState};
use crate::errors::{EngineError, FieldError, FieldErrorKind};
use crate::events::*;
use crate::meta::{self, MetaTable};
use crate::privilege::Verb;

/// Command validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No events for this aggregate yet
    #[error("Resource {0} not initialized")]
    NotInitialized(String),

    /// Aggregate already has a creation event
    #[error("Resource {0} already exists")]
    AlreadyInitialized(String),

    /// Aggregate was removed by an earlier command
    #[error("Resource {0} has been removed")]
    Removed(String),

    #[error("Resource {0} is not a collection")]
    NotACollection(String),

    /// Collections are deleted only once their members are gone
    #[error("Collection {uri} still has {members} member(s)")]
    CollectionNotEmpty { uri: String, members: usize },

    #[error("Resource {0} is not a session")]
    NotASession(String),

    /// One or more fields failed validation
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
}

impl From<CommandError> for EngineError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotInitialized(uri) | CommandError::Removed(uri) => {
                EngineError::NotFound(uri)
            }
            CommandError::NotASession(uri) => EngineError::NotFound(uri),
            CommandError::Validation(fields) => EngineError::Validation(fields),
            other @ (CommandError::AlreadyInitialized(_)
            | CommandError::NotACollection(_)
            | CommandError::CollectionNotEmpty { .. }) => EngineError::Conflict(other.to_string()),
        }
    }
}

fn require_live(state: &ResourceState) -> Result<(), CommandError> {
    if !state.is_initialized() {
        return Err(CommandError::NotInitialized(state.uri.clone()));
    }
    if state.is_removed() {
        return Err(CommandError::Removed(state.uri.clone()));
    }
    Ok(())
}

/// Read result of a GET
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub body: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
}

/// Handle GET
///
/// Read-only: runs the pre-read pass and resolves every non-meta property
/// through its getter. Adds a weak `ETag` derived from the aggregate version.
pub fn handle_get(state: &ResourceState, meta: &MetaTable) -> Result<ResourceView, CommandError> {
    require_live(state)?;

    let mut headers = state.headers.clone();
    headers.insert("ETag".to_string(), format!("W/\"{}\"", state.version));

    Ok(ResourceView {
        body: meta::render(state, meta),
        headers,
    })
}

/// Handle CreateResource
///
/// # Business Rules
/// - Aggregate must not already be live
///
/// Capability entries for every registered descriptor are written into the
/// initial properties as `X@meta`.
pub fn handle_create_resource(
    state: &ResourceState,
    command: &CreateResourceCommand,
    aggregate_id: Uuid,
) -> Result<ResourceCreated, CommandError> {
    if state.is_live() {
        return Err(CommandError::AlreadyInitialized(state.uri.clone()));
    }

    let mut properties = command.properties.clone();
    properties.extend(command.meta.capability_entries());

    Ok(ResourceCreated {
        event_version: ResourceCreated::CURRENT_VERSION,
        event_id: Uuid::now_v7(),
        aggregate_id,
        timestamp: command.timestamp,
        correlation_id: command.correlation_id,
        causation_id: None,
        resource_uri: command.uri.clone(),
        resource_type: command.resource_type.clone(),
        context: command.context.clone(),
        collection: command.collection,
        properties,
        privileges: command.privileges.clone(),
        headers: command.headers.clone(),
        writable: command.writable.clone(),
        patch_policy: command.patch_policy,
        session: command.session.clone(),
    })
}

/// Result of a PATCH that was not rejected outright
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// One `PropertyChanged` per field whose raw value changed
    pub events: Vec<ResourceEvent>,
    /// Fields that failed validation
    pub errors: Vec<FieldError>,
}

/// Handle PATCH
///
/// # Business Rules
/// - Resource must be live
/// - Each field passes its property-level privilege override, if one names
///   PATCH, then `resolve_set`
/// - `PartialSuccess`: valid fields apply, invalid ones are reported, unless
///   every field failed
/// - `AllOrNothing`: any invalid field rejects the whole body
pub fn handle_patch(
    state: &ResourceState,
    meta_table: &MetaTable,
    command: &PatchCommand,
) -> Result<PatchOutcome, CommandError> {
    require_live(state)?;

    let mut events = Vec::new();
    let mut errors = Vec::new();

    for (name, proposed) in &command.body {
        let override_req = meta_table
            .get(name)
            .and_then(|d| d.privileges())
            .and_then(|p| p.requirement(Verb::Patch));

        if let Some(requirement) = override_req {
            if !command.caller.is_internal()
                && !requirement.is_satisfied_by(&command.caller.privileges)
            {
                errors.push(FieldError::new(
                    name,
                    FieldErrorKind::InsufficientPrivilege,
                    format!(
                        "writing {} requires {:?}",
                        name,
                        requirement.privileges()
                    ),
                ));
                continue;
            }
        }

        match meta::resolve_set(state, meta_table, name, proposed) {
            Ok(Some(value)) => events.push(ResourceEvent::PropertyChanged(PropertyChanged {
                event_version: PropertyChanged::CURRENT_VERSION,
                event_id: Uuid::now_v7(),
                aggregate_id: state.id,
                timestamp: command.timestamp,
                correlation_id: command.correlation_id,
                causation_id: None,
                property: name.clone(),
                previous: state.properties.get(name).cloned(),
                value,
            })),
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }

    let all_failed = !command.body.is_empty() && errors.len() == command.body.len();
    let rejected = match state.patch_policy {
        PatchPolicy::AllOrNothing => !errors.is_empty(),
        PatchPolicy::PartialSuccess => all_failed,
    };
    if rejected {
        return Err(CommandError::Validation(errors));
    }

    Ok(PatchOutcome { events, errors })
}

/// Handle DELETE
///
/// # Business Rules
/// - Resource must exist
/// - A collection must have no members
/// - Deleting a removed resource succeeds only for the command that removed
///   it (a retry carrying the same correlation id), yielding no new event
pub fn handle_delete(
    state: &ResourceState,
    command: &DeleteCommand,
) -> Result<Option<ResourceRemoved>, CommandError> {
    if !state.is_initialized() {
        return Err(CommandError::NotInitialized(state.uri.clone()));
    }

    if let Some(removal) = &state.removed {
        if removal.correlation_id == command.correlation_id {
            return Ok(None);
        }
        return Err(CommandError::Removed(state.uri.clone()));
    }

    if state.collection && !state.members.is_empty() {
        return Err(CommandError::CollectionNotEmpty {
            uri: state.uri.clone(),
            members: state.members.len(),
        });
    }

    Ok(Some(ResourceRemoved {
        event_version: ResourceRemoved::CURRENT_VERSION,
        event_id: Uuid::now_v7(),
        aggregate_id: state.id,
        timestamp: command.timestamp,
        correlation_id: command.correlation_id,
        causation_id: None,
        resource_uri: state.uri.clone(),
    }))
}

/// Handle AddMember
///
/// # Business Rules
/// - Target must be a live collection
/// - Adding an existing member yields no event
pub fn handle_add_member(
    state: &ResourceState,
    command: &AddMemberCommand,
) -> Result<Option<CollectionMemberAdded>, CommandError> {
    require_live(state)?;
    if !state.collection {
        return Err(CommandError::NotACollection(state.uri.clone()));
    }
    if state.has_member(command.member_id) {
        return Ok(None);
    }

    Ok(Some(CollectionMemberAdded {
        event_version: CollectionMemberAdded::CURRENT_VERSION,
        event_id: Uuid::now_v7(),
        aggregate_id: state.id,
        timestamp: command.timestamp,
        correlation_id: command.correlation_id,
        causation_id: command.causation_id,
        member_id: command.member_id,
        member_uri: command.member_uri.clone(),
    }))
}

/// Handle RemoveMember
///
/// Removing a member that is not listed yields no event.
pub fn handle_remove_member(
    state: &ResourceState,
    command: &RemoveMemberCommand,
) -> Result<Option<CollectionMemberRemoved>, CommandError> {
    require_live(state)?;
    if !state.collection {
        return Err(CommandError::NotACollection(state.uri.clone()));
    }

    Ok(state
        .members
        .iter()
        .find(|m| m.id == command.member_id)
        .map(|m| CollectionMemberRemoved {
            event_version: CollectionMemberRemoved::CURRENT_VERSION,
            event_id: Uuid::now_v7(),
            aggregate_id: state.id,
            timestamp: command.timestamp,
            correlation_id: command.correlation_id,
            causation_id: command.causation_id,
            member_id: m.id,
            member_uri: m.uri.clone(),
        }))
}

/// Handle UpdateProperties
///
/// Raw writes skip setters and the writable set. Meta entries cannot be
/// written this way. Only changed values produce events.
pub fn handle_update_properties(
    state: &ResourceState,
    command: &UpdatePropertiesCommand,
) -> Result<Vec<PropertyChanged>, CommandError> {
    require_live(state)?;

    let rejected: Vec<FieldError> = command
        .properties
        .keys()
        .filter(|k| meta::is_meta_key(k))
        .map(FieldError::unknown)
        .collect();
    if !rejected.is_empty() {
        return Err(CommandError::Validation(rejected));
    }

    Ok(command
        .properties
        .iter()
        .filter(|(name, value)| state.properties.get(*name) != Some(*value))
        .map(|(name, value)| PropertyChanged {
            event_version: PropertyChanged::CURRENT_VERSION,
            event_id: Uuid::now_v7(),
            aggregate_id: state.id,
            timestamp: command.timestamp,
            correlation_id: command.correlation_id,
            causation_id: None,
            property: name.clone(),
            value: value.clone(),
            previous: state.properties.get(name).cloned(),
        })
        .collect())
}

/// Handle RefreshSession
///
/// # Business Rules
/// - Resource must be a live session
pub fn handle_refresh_session(
    state: &ResourceState,
    command: &RefreshSessionCommand,
) -> Result<SessionTokenRefreshed, CommandError> {
    require_live(state)?;
    if state.session.is_none() {
        return Err(CommandError::NotASession(state.uri.clone()));
    }

    Ok(SessionTokenRefreshed {
        event_version: SessionTokenRefreshed::CURRENT_VERSION,
        event_id: Uuid::now_v7(),
        aggregate_id: state.id,
        timestamp: command.timestamp,
        correlation_id: command.correlation_id,
        causation_id: None,
        session_uri: state.uri.clone(),
    })
}
