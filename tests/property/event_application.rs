// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Resource Fold
//!
//! These tests prove properties of `apply_event` that must hold for every
//! event sequence a collection aggregate can receive.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Map};
use uuid::Uuid;

use cim_redfish::aggregate::{apply_event, PatchPolicy, ResourceState};
use cim_redfish::events::{
    CollectionMemberAdded, CollectionMemberRemoved, PropertyChanged, ResourceCreated,
    ResourceEvent,
};
use cim_redfish::privilege::PrivilegeMap;

// ============================================================================
// Test Event Definition
// ============================================================================

/// Compact description of one post-creation event
#[derive(Debug, Clone)]
enum Step {
    Set { property: u8, value: i64 },
    Add(u8),
    Remove(u8),
}

fn aggregate_id() -> Uuid {
    Uuid::from_u128(0x01934f4a_1000_7000_8000_000000001000)
}

fn member_id(n: u8) -> Uuid {
    Uuid::from_u128(0x01934f4a_2000_7000_8000_000000000000 + n as u128)
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_768_824_000 + seconds, 0).unwrap()
}

fn created() -> ResourceEvent {
    ResourceEvent::ResourceCreated(ResourceCreated {
        event_version: ResourceCreated::CURRENT_VERSION,
        event_id: Uuid::from_u128(1),
        aggregate_id: aggregate_id(),
        timestamp: at(0),
        correlation_id: Uuid::from_u128(2),
        causation_id: None,
        resource_uri: "/redfish/v1/Widgets".to_string(),
        resource_type: "#WidgetCollection.WidgetCollection".to_string(),
        context: "/redfish/v1/$metadata#WidgetCollection.WidgetCollection".to_string(),
        collection: true,
        properties: Map::new(),
        privileges: PrivilegeMap::new(),
        headers: BTreeMap::new(),
        writable: BTreeSet::new(),
        patch_policy: PatchPolicy::PartialSuccess,
        session: None,
    })
}

fn to_event(index: usize, step: &Step) -> ResourceEvent {
    let event_id = Uuid::from_u128(1000 + index as u128);
    let correlation_id = Uuid::from_u128(2000 + index as u128);
    let timestamp = at(index as i64 + 1);
    match step {
        Step::Set { property, value } => ResourceEvent::PropertyChanged(PropertyChanged {
            event_version: PropertyChanged::CURRENT_VERSION,
            event_id,
            aggregate_id: aggregate_id(),
            timestamp,
            correlation_id,
            causation_id: None,
            property: format!("P{}", property),
            value: json!(value),
            previous: None,
        }),
        Step::Add(n) => ResourceEvent::CollectionMemberAdded(CollectionMemberAdded {
            event_version: CollectionMemberAdded::CURRENT_VERSION,
            event_id,
            aggregate_id: aggregate_id(),
            timestamp,
            correlation_id,
            causation_id: None,
            member_id: member_id(*n),
            member_uri: format!("/redfish/v1/Widgets/{}", n),
        }),
        Step::Remove(n) => ResourceEvent::CollectionMemberRemoved(CollectionMemberRemoved {
            event_version: CollectionMemberRemoved::CURRENT_VERSION,
            event_id,
            aggregate_id: aggregate_id(),
            timestamp,
            correlation_id,
            causation_id: None,
            member_id: member_id(*n),
            member_uri: format!("/redfish/v1/Widgets/{}", n),
        }),
    }
}

fn history(steps: &[Step]) -> Vec<ResourceEvent> {
    std::iter::once(created())
        .chain(steps.iter().enumerate().map(|(i, s)| to_event(i, s)))
        .collect()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..4, -100i64..100).prop_map(|(property, value)| Step::Set { property, value }),
        (0u8..6).prop_map(Step::Add),
        (0u8..6).prop_map(Step::Remove),
    ]
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(), 0..40)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: the fold is deterministic
    #[test]
    fn prop_fold_is_deterministic(steps in steps()) {
        let events = history(&steps);
        prop_assert_eq!(
            ResourceState::from_events(&events),
            ResourceState::from_events(&events)
        );
    }

    /// Property: every applied event bumps the version by one
    #[test]
    fn prop_version_counts_events(steps in steps()) {
        let events = history(&steps);
        let state = ResourceState::from_events(&events);
        prop_assert_eq!(state.version, events.len() as u64);
    }

    /// Property: folding a prefix then the rest equals folding everything
    #[test]
    fn prop_fold_is_incremental(steps in steps(), split in 0usize..41) {
        let events = history(&steps);
        let split = split.min(events.len());

        let partial = events[..split]
            .iter()
            .fold(ResourceState::default_for(aggregate_id()), apply_event);
        let resumed = events[split..].iter().fold(partial, apply_event);

        prop_assert_eq!(resumed, ResourceState::from_events(&events));
    }

    /// Property: members are the distinct adds, in first-add order, minus removals
    #[test]
    fn prop_members_track_adds_and_removes(steps in steps()) {
        let mut expected: Vec<u8> = Vec::new();
        for step in &steps {
            match step {
                Step::Add(n) if !expected.contains(n) => expected.push(*n),
                Step::Remove(n) => expected.retain(|m| m != n),
                _ => {}
            }
        }

        let state = ResourceState::from_events(&history(&steps));
        let actual: Vec<Uuid> = state.members.iter().map(|m| m.id).collect();
        let expected: Vec<Uuid> = expected.into_iter().map(member_id).collect();
        prop_assert_eq!(actual, expected);
    }

    /// Property: the last write to a property wins
    #[test]
    fn prop_last_write_wins(steps in steps()) {
        let mut expected: BTreeMap<String, i64> = BTreeMap::new();
        for step in &steps {
            if let Step::Set { property, value } = step {
                expected.insert(format!("P{}", property), *value);
            }
        }

        let state = ResourceState::from_events(&history(&steps));
        for (property, value) in expected {
            prop_assert_eq!(&state.properties[&property], &json!(value));
        }
    }
}
