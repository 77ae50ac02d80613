// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Meta Engine and Session Tokens

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

use cim_redfish::aggregate::ResourceState;
use cim_redfish::meta::validators::integer_range;
use cim_redfish::meta::{
    coerce, is_meta_key, meta_key, render, resolve_set, MetaDescriptor, MetaTable,
    PropertyHandle,
};
use cim_redfish::session::{SessionClaims, TokenSigner};
use cim_redfish::FieldErrorKind;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn property_name() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z]{0,11}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(Value::Bool),
        "[a-z ]{0,16}".prop_map(Value::String),
    ]
}

/// State holding `names` as plain properties, each also carrying a meta entry
fn state_with(names: &[(String, Value)]) -> ResourceState {
    let mut state = ResourceState::default_for(Uuid::from_u128(7));
    state.uri = "/redfish/v1/Widgets/7".to_string();
    for (name, value) in names {
        state.properties.insert(name.clone(), value.clone());
        state
            .properties
            .insert(meta_key(name), json!({ "has_getter": true }));
    }
    state
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: a rendered view never exposes meta bookkeeping
    #[test]
    fn prop_render_hides_meta_entries(
        props in prop::collection::vec((property_name(), scalar()), 0..12)
    ) {
        let state = state_with(&props);
        let meta = props.iter().fold(MetaTable::new(), |table, (name, _)| {
            table.with(name.clone(), MetaDescriptor::new().with_getter(|raw| raw.clone()))
        });

        let view = render(&state, &meta);

        prop_assert!(view.keys().all(|k| !is_meta_key(k)));
        for (name, _) in &props {
            prop_assert!(view.contains_key(name));
        }
    }

    /// Property: integral floats written to integer properties are narrowed
    #[test]
    fn prop_coerce_narrows_integral_floats(existing in any::<i32>(), proposed in any::<i32>()) {
        let coerced = coerce("Counter", &json!(existing), &json!(proposed as f64)).unwrap();
        prop_assert_eq!(coerced, json!(proposed as i64));
    }

    /// Property: fractional floats never land in an integer property
    #[test]
    fn prop_coerce_rejects_fractions(whole in -1_000_000i64..1_000_000, frac in 0.01f64..0.99) {
        let err = coerce("Counter", &json!(0), &json!(whole as f64 + frac)).unwrap_err();
        prop_assert_eq!(err.kind, FieldErrorKind::TypeMismatch);
    }

    /// Property: a range setter accepts exactly the values within its bounds
    #[test]
    fn prop_integer_range_accepts_iff_in_bounds(
        min in -1000i64..1000,
        span in 0i64..1000,
        value in -3000i64..3000,
    ) {
        let max = min + span;
        let setter = integer_range(min, max);
        let mut handle = PropertyHandle::new("Timeout", None);

        let result = setter(&mut handle, &json!(value));

        if (min..=max).contains(&value) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(handle.value(), Some(&json!(value)));
        } else {
            prop_assert_eq!(result.unwrap_err().kind, FieldErrorKind::OutOfRange);
            prop_assert_eq!(handle.value(), None);
        }
    }

    /// Property: writes to meta keys are always rejected as unknown
    #[test]
    fn prop_meta_keys_are_not_writable(name in property_name(), value in scalar()) {
        let mut state = state_with(&[(name.clone(), value.clone())]);
        state.writable.insert(meta_key(&name));

        let err = resolve_set(&state, &MetaTable::new(), &meta_key(&name), &value).unwrap_err();
        prop_assert_eq!(err.kind, FieldErrorKind::UnknownProperty);
    }

    /// Property: a minted token verifies to the same claims before expiry
    #[test]
    fn prop_token_round_trip(
        username in "[a-zA-Z0-9_.-]{1,32}",
        issued in 1_600_000_000i64..2_000_000_000,
        lifetime in 1i64..86_400,
        elapsed in 0i64..86_400,
    ) {
        let signer = TokenSigner::from_secret("proptest-secret");
        let issued_at = Utc.timestamp_opt(issued, 0).unwrap();
        let claims = SessionClaims::new(
            username,
            ["Login"],
            "/redfish/v1/SessionService/Sessions/1",
            issued_at,
            Duration::seconds(lifetime),
        );
        let token = signer.mint(&claims).unwrap();
        let now = issued_at + Duration::seconds(elapsed);

        match signer.verify(&token, now) {
            Ok(verified) => {
                prop_assert!(elapsed < lifetime);
                prop_assert_eq!(verified, claims);
            }
            Err(_) => prop_assert!(elapsed >= lifetime),
        }
    }

    /// Property: a token never verifies under a different secret
    #[test]
    fn prop_token_bound_to_secret(a in "[a-z]{8,16}", b in "[a-z]{8,16}") {
        prop_assume!(a != b);
        let now = Utc.timestamp_opt(1_768_824_000, 0).unwrap();
        let claims = SessionClaims::new("root", ["Login"], "/s/1", now, Duration::hours(1));

        let token = TokenSigner::from_secret(a).mint(&claims).unwrap();
        prop_assert!(TokenSigner::from_secret(b).verify(&token, now).is_err());
    }
}
