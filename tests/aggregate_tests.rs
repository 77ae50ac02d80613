// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for aggregate event application and state reconstruction
//!
//! These tests verify the complete flow:
//! 1. Handle command → generate event
//! 2. Apply event → produce new state
//! 3. Reconstruct state from event stream
//!
//! Handlers are driven directly, without the service or any locks.

mod fixtures;

use serde_json::json;
use uuid::Uuid;

use cim_redfish::aggregate::{
    apply_event, handle_add_member, handle_create_resource, handle_delete, handle_get,
    handle_patch, handle_remove_member, AddMemberCommand, CommandError, DeleteCommand,
    PatchCommand, PatchPolicy, RemoveMemberCommand, ResourceState,
};
use cim_redfish::events::ResourceEvent;
use cim_redfish::meta::validators::integer_range;
use cim_redfish::meta::{MetaDescriptor, MetaTable};
use cim_redfish::privilege::CallerIdentity;
use cim_redfish::FieldErrorKind;

use fixtures::*;

fn patch(body: serde_json::Value) -> PatchCommand {
    PatchCommand {
        body: body.as_object().cloned().unwrap(),
        caller: CallerIdentity::internal(),
        timestamp: fixed_timestamp(),
        correlation_id: parse_uuid(CORRELATION_ID_2),
    }
}

fn created_state(meta: &MetaTable) -> (ResourceState, Vec<ResourceEvent>) {
    let id = parse_uuid(AGGREGATE_ID_1);
    let command = create_command("/redfish/v1/Widgets/1").with_meta(meta.clone());
    let created = handle_create_resource(&ResourceState::default_for(id), &command, id)
        .expect("create succeeds");
    let event = ResourceEvent::ResourceCreated(created);
    let state = apply_event(ResourceState::default_for(id), &event);
    (state, vec![event])
}

/// Test: create, patch and delete, then rebuild from the log
#[test]
fn test_complete_resource_lifecycle() {
    let meta = MetaTable::new().with(
        "Counter",
        MetaDescriptor::new().with_setter(integer_range(0, 100)),
    );
    let (mut state, mut events) = created_state(&meta);

    assert!(state.is_live());
    assert_eq!(state.version, 1);
    assert!(state.properties.contains_key("Counter@meta"));

    // Step 1: PATCH
    let outcome = handle_patch(&state, &meta, &patch(json!({"Counter": 42.0, "Label": "x"})))
        .expect("patch accepted");
    assert_eq!(outcome.events.len(), 2);
    assert!(outcome.errors.is_empty());
    for event in &outcome.events {
        state = apply_event(state, event);
    }
    events.extend(outcome.events);
    assert_eq!(state.properties["Counter"], json!(42));
    assert_eq!(state.properties["Label"], json!("x"));

    // Step 2: GET hides capability entries
    let view = handle_get(&state, &meta).unwrap();
    assert!(view.body.keys().all(|k| !k.ends_with("@meta")));
    assert_eq!(view.headers.get("ETag").map(String::as_str), Some("W/\"3\""));

    // Step 3: DELETE
    let delete = DeleteCommand {
        caller: CallerIdentity::internal(),
        timestamp: fixed_timestamp(),
        correlation_id: parse_uuid(CORRELATION_ID_1),
    };
    let removed = handle_delete(&state, &delete).unwrap().expect("first delete emits");
    let removed = ResourceEvent::ResourceRemoved(removed);
    state = apply_event(state, &removed);
    events.push(removed);

    assert!(!state.is_live());
    assert!(matches!(handle_get(&state, &meta), Err(CommandError::Removed(_))));
    assert_eq!(handle_delete(&state, &delete).unwrap(), None);

    // Step 4: rebuild
    assert_eq!(ResourceState::from_events(&events), state);
}

#[test]
fn test_patch_identical_value_emits_nothing() {
    let meta = MetaTable::new();
    let (state, _) = created_state(&meta);

    let outcome = handle_patch(&state, &meta, &patch(json!({"Label": "plain"}))).unwrap();
    assert!(outcome.events.is_empty());
    assert!(outcome.errors.is_empty());
}

#[test]
fn test_partial_patch_reports_failures() {
    let meta = MetaTable::new();
    let (state, _) = created_state(&meta);

    let outcome = handle_patch(
        &state,
        &meta,
        &patch(json!({"Label": "new", "Name": "nope", "Bogus": 1, "Counter": "seven"})),
    )
    .unwrap();

    assert_eq!(outcome.events.len(), 1);
    let mut kinds: Vec<FieldErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
    kinds.sort_by_key(|k| format!("{:?}", k));
    assert_eq!(
        kinds,
        vec![
            FieldErrorKind::ReadOnly,
            FieldErrorKind::TypeMismatch,
            FieldErrorKind::UnknownProperty,
        ]
    );
}

#[test]
fn test_all_or_nothing_rejects_whole_body() {
    let id = parse_uuid(AGGREGATE_ID_1);
    let meta = MetaTable::new();
    let command = create_command("/redfish/v1/Widgets/1").with_patch_policy(PatchPolicy::AllOrNothing);
    let created = handle_create_resource(&ResourceState::default_for(id), &command, id).unwrap();
    let state = apply_event(
        ResourceState::default_for(id),
        &ResourceEvent::ResourceCreated(created),
    );

    match handle_patch(&state, &meta, &patch(json!({"Label": "ok", "Bogus": 1}))) {
        Err(CommandError::Validation(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_reserved_keys_are_not_writable() {
    let meta = MetaTable::new();
    let (state, _) = created_state(&meta);

    let result = handle_patch(
        &state,
        &meta,
        &patch(json!({"@odata.id": "/elsewhere", "Counter@meta": {}})),
    );
    match result {
        Err(CommandError::Validation(errors)) => {
            assert!(errors.iter().all(|e| e.kind == FieldErrorKind::UnknownProperty))
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_collection_membership() {
    let id = parse_uuid(AGGREGATE_ID_2);
    let command = create_command("/redfish/v1/Widgets").as_collection();
    let created = handle_create_resource(&ResourceState::default_for(id), &command, id).unwrap();
    let mut state = apply_event(
        ResourceState::default_for(id),
        &ResourceEvent::ResourceCreated(created),
    );

    let member_id = parse_uuid(AGGREGATE_ID_1);
    let add = AddMemberCommand {
        member_id,
        member_uri: "/redfish/v1/Widgets/1".to_string(),
        timestamp: fixed_timestamp(),
        correlation_id: parse_uuid(CORRELATION_ID_1),
        causation_id: None,
    };
    let added = handle_add_member(&state, &add).unwrap().expect("new member");
    state = apply_event(state, &ResourceEvent::CollectionMemberAdded(added));
    assert!(handle_add_member(&state, &add).unwrap().is_none());

    let view = handle_get(&state, &MetaTable::new()).unwrap();
    assert_eq!(view.body["Members@odata.count"], json!(1));
    assert_eq!(
        view.body["Members"],
        json!([{ "@odata.id": "/redfish/v1/Widgets/1" }])
    );

    let delete = DeleteCommand {
        caller: CallerIdentity::internal(),
        timestamp: fixed_timestamp(),
        correlation_id: Uuid::nil(),
    };
    assert!(matches!(
        handle_delete(&state, &delete),
        Err(CommandError::CollectionNotEmpty { members: 1, .. })
    ));

    let remove = RemoveMemberCommand {
        member_id,
        timestamp: fixed_timestamp(),
        correlation_id: parse_uuid(CORRELATION_ID_2),
        causation_id: None,
    };
    let removed = handle_remove_member(&state, &remove).unwrap().expect("listed");
    state = apply_event(state, &ResourceEvent::CollectionMemberRemoved(removed));
    assert!(state.members.is_empty());
    assert!(handle_delete(&state, &delete).unwrap().is_some());
}

#[test]
fn test_events_for_other_aggregates_are_ignored() {
    let meta = MetaTable::new();
    let (state, _) = created_state(&meta);

    let other = parse_uuid(AGGREGATE_ID_2);
    let command = create_command("/redfish/v1/Other");
    let foreign = handle_create_resource(&ResourceState::default_for(other), &command, other).unwrap();

    let after = apply_event(state.clone(), &ResourceEvent::ResourceCreated(foreign));
    assert_eq!(after, state);
}
