// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property Meta Engine
//!
//! Each resource may attach a [`MetaDescriptor`] to any of its properties. A
//! descriptor bundles up to three functions plus an optional privilege
//! override:
//!
//! - **getter**: `raw → effective` on every read
//! - **setter**: validates a proposed value and writes it into a
//!   [`PropertyHandle`], or rejects it with a [`FieldError`]
//! - **formatter**: shapes the effective value for presentation
//!
//! Descriptors are resource-local. Two resources may carry a property with the
//! same name and entirely different descriptors.
//!
//! For every descriptor the stored properties carry a companion `X@meta` entry
//! describing its capabilities. These entries are bookkeeping only and never
//! appear in a read result.
//!
//! ```text
//! GET:   raw ──getter──▶ effective ──formatter──▶ result
//! PATCH: proposed ──setter(handle)──▶ new raw ──▶ PropertyChanged
//! ```
//!
//! The engine never persists anything. `resolve_set` only computes the new raw
//! value; the caller turns it into an event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::aggregate::ResourceState;
use crate::errors::FieldError;
use crate::privilege::PrivilegeMap;

pub mod validators;

/// Suffix marking meta bookkeeping entries in the property map
pub const META_SUFFIX: &str = "@meta";

/// `Name` → `Name@meta`
pub fn meta_key(property: &str) -> String {
    format!("{}{}", property, META_SUFFIX)
}

pub fn is_meta_key(key: &str) -> bool {
    key.ends_with(META_SUFFIX)
}

/// Keys the engine renders itself and never accepts from a client
fn is_reserved_key(key: &str) -> bool {
    is_meta_key(key) || key.starts_with("@odata.") || key.starts_with("Members")
}

pub type Getter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut PropertyHandle<'_>, &Value) -> Result<(), FieldError> + Send + Sync>;
pub type Formatter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// What a descriptor can do, as stored in the `X@meta` entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaCapabilities {
    pub has_getter: bool,
    pub has_setter: bool,
    pub has_formatter: bool,
    pub has_privilege_override: bool,
}

/// Per-property read/write metadata
#[derive(Clone, Default)]
pub struct MetaDescriptor {
    getter: Option<Getter>,
    setter: Option<Setter>,
    formatter: Option<Formatter>,
    privileges: Option<PrivilegeMap>,
}

impl MetaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut PropertyHandle<'_>, &Value) -> Result<(), FieldError> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Property-level privilege override, checked in addition to the
    /// resource-level requirement
    pub fn with_privileges(mut self, privileges: PrivilegeMap) -> Self {
        self.privileges = Some(privileges);
        self
    }

    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    pub fn formatter(&self) -> Option<&Formatter> {
        self.formatter.as_ref()
    }

    pub fn privileges(&self) -> Option<&PrivilegeMap> {
        self.privileges.as_ref()
    }

    pub fn capabilities(&self) -> MetaCapabilities {
        MetaCapabilities {
            has_getter: self.getter.is_some(),
            has_setter: self.setter.is_some(),
            has_formatter: self.formatter.is_some(),
            has_privilege_override: self.privileges.is_some(),
        }
    }
}

impl fmt::Debug for MetaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDescriptor")
            .field("capabilities", &self.capabilities())
            .field("privileges", &self.privileges)
            .finish()
    }
}

/// Descriptors for one resource, keyed by property name
#[derive(Debug, Clone, Default)]
pub struct MetaTable(BTreeMap<String, MetaDescriptor>);

impl MetaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, property: impl Into<String>, descriptor: MetaDescriptor) -> Self {
        self.register(property, descriptor);
        self
    }

    /// Register or replace the descriptor for `property`
    pub fn register(&mut self, property: impl Into<String>, descriptor: MetaDescriptor) {
        self.0.insert(property.into(), descriptor);
    }

    pub fn get(&self, property: &str) -> Option<&MetaDescriptor> {
        self.0.get(property)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaDescriptor)> {
        self.0.iter()
    }

    /// `X@meta` entries describing every registered descriptor
    pub fn capability_entries(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, descriptor)| {
                let caps = serde_json::to_value(descriptor.capabilities()).unwrap_or(Value::Null);
                (meta_key(name), caps)
            })
            .collect()
    }
}

/// Mutable view of one property handed to a setter
#[derive(Debug)]
pub struct PropertyHandle<'a> {
    name: &'a str,
    current: Option<&'a Value>,
    updated: Option<Value>,
}

impl<'a> PropertyHandle<'a> {
    pub fn new(name: &'a str, current: Option<&'a Value>) -> Self {
        Self {
            name,
            current,
            updated: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Raw value before this write
    pub fn current(&self) -> Option<&Value> {
        self.current
    }

    /// Value after this write: the updated one if the setter set it
    pub fn value(&self) -> Option<&Value> {
        self.updated.as_ref().or(self.current)
    }

    pub fn set(&mut self, value: Value) {
        self.updated = Some(value);
    }

    fn into_update(self) -> Option<Value> {
        let current = self.current;
        self.updated.filter(|v| Some(v) != current)
    }
}

/// Pre-read pass producing the property view a GET renders from
///
/// Adds the `@odata` identity fields and, for collections, the member list
/// and count derived from membership events.
pub fn process_meta(state: &ResourceState) -> Map<String, Value> {
    let mut view = state.properties.clone();

    view.insert("@odata.id".to_string(), Value::String(state.uri.clone()));
    view.insert("@odata.type".to_string(), Value::String(state.resource_type.clone()));
    view.insert("@odata.context".to_string(), Value::String(state.context.clone()));

    if state.collection {
        let members: Vec<Value> = state
            .members
            .iter()
            .map(|m| json!({ "@odata.id": m.uri }))
            .collect();
        view.insert("Members@odata.count".to_string(), json!(members.len()));
        view.insert("Members".to_string(), Value::Array(members));
    }

    view
}

/// Effective value of `name` for a read
///
/// Runs the registered getter over the raw value (or over `null` when the
/// property has no stored value), then the formatter. Without a descriptor
/// the raw value is returned verbatim.
pub fn resolve_get(view: &Map<String, Value>, meta: &MetaTable, name: &str) -> Option<Value> {
    let raw = view.get(name);
    let Some(descriptor) = meta.get(name) else {
        return raw.cloned();
    };

    let effective = match (descriptor.getter(), raw) {
        (Some(getter), Some(raw)) => getter(raw),
        (Some(getter), None) => getter(&Value::Null),
        (None, Some(raw)) => raw.clone(),
        (None, None) => return None,
    };

    Some(match descriptor.formatter() {
        Some(formatter) => formatter(&effective),
        None => effective,
    })
}

/// Build a read result: every non-meta property, resolved through its getter
pub fn render(state: &ResourceState, meta: &MetaTable) -> Map<String, Value> {
    let view = process_meta(state);
    let mut names: Vec<&String> = view.keys().filter(|k| !is_meta_key(k)).collect();

    // getter-only properties need no stored raw value
    for (name, descriptor) in meta.iter() {
        if descriptor.getter().is_some() && !view.contains_key(name) {
            names.push(name);
        }
    }

    names
        .into_iter()
        .filter_map(|name| resolve_get(&view, meta, name).map(|value| (name.clone(), value)))
        .collect()
}

/// Validate a proposed write and compute the new raw value
///
/// Returns `Ok(Some(value))` when the raw value changes, `Ok(None)` when the
/// write is accepted but leaves the value as it was.
pub fn resolve_set(
    state: &ResourceState,
    meta: &MetaTable,
    name: &str,
    proposed: &Value,
) -> Result<Option<Value>, FieldError> {
    if is_reserved_key(name) {
        return Err(FieldError::unknown(name));
    }

    let current = state.properties.get(name);

    if let Some(setter) = meta.get(name).and_then(MetaDescriptor::setter) {
        let mut handle = PropertyHandle::new(name, current);
        setter(&mut handle, proposed)?;
        return Ok(handle.into_update());
    }

    if !state.writable.contains(name) {
        return match current {
            Some(_) => Err(FieldError::read_only(name)),
            None if meta.get(name).is_some() => Err(FieldError::read_only(name)),
            None => Err(FieldError::unknown(name)),
        };
    }

    let coerced = match current {
        Some(existing) => coerce(name, existing, proposed)?,
        None => proposed.clone(),
    };

    Ok(Some(coerced).filter(|v| Some(v) != current))
}

/// Coerce `proposed` to the JSON shape of `existing`
///
/// Integral floats become integers when the stored value is an integer;
/// `null` stored values accept anything.
pub fn coerce(name: &str, existing: &Value, proposed: &Value) -> Result<Value, FieldError> {
    match (existing, proposed) {
        (Value::Null, v) => Ok(v.clone()),
        (Value::Number(e), Value::Number(p)) if e.is_i64() || e.is_u64() => {
            if p.is_i64() || p.is_u64() {
                return Ok(proposed.clone());
            }
            match p.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(json!(f as i64)),
                _ => Err(FieldError::type_mismatch(name, "integer")),
            }
        }
        (Value::Number(_), Value::Number(_)) => Ok(proposed.clone()),
        (Value::String(_), Value::String(_)) => Ok(proposed.clone()),
        (Value::Bool(_), Value::Bool(_)) => Ok(proposed.clone()),
        (Value::Array(_), Value::Array(_)) => Ok(proposed.clone()),
        (Value::Object(_), Value::Object(_)) => Ok(proposed.clone()),
        (existing, _) => Err(FieldError::type_mismatch(name, json_type_name(existing))),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResourceState;
    use crate::errors::FieldErrorKind;
    use uuid::Uuid;

    fn state_with(properties: Value, writable: &[&str]) -> ResourceState {
        let mut state = ResourceState::default_for(Uuid::now_v7());
        state.uri = "/redfish/v1/Systems/1".to_string();
        state.properties = properties.as_object().cloned().unwrap_or_default();
        state.writable = writable.iter().map(|s| s.to_string()).collect();
        state
    }

    #[test]
    fn test_getter_transforms_raw_value() {
        let state = state_with(json!({"Reading": 41}), &[]);
        let meta = MetaTable::new().with(
            "Reading",
            MetaDescriptor::new().with_getter(|raw| json!(raw.as_i64().unwrap_or(0) + 1)),
        );

        let view = process_meta(&state);
        assert_eq!(resolve_get(&view, &meta, "Reading"), Some(json!(42)));
    }

    #[test]
    fn test_formatter_runs_after_getter() {
        let state = state_with(json!({"Reading": 20}), &[]);
        let meta = MetaTable::new().with(
            "Reading",
            MetaDescriptor::new()
                .with_getter(|raw| json!(raw.as_i64().unwrap_or(0) * 2))
                .with_formatter(|v| json!(format!("{} C", v))),
        );

        let view = process_meta(&state);
        assert_eq!(resolve_get(&view, &meta, "Reading"), Some(json!("40 C")));
    }

    #[test]
    fn test_render_hides_meta_entries() {
        let mut state = state_with(json!({"Name": "chassis"}), &[]);
        let meta = MetaTable::new().with("Name", MetaDescriptor::new().with_getter(|v| v.clone()));
        state.properties.extend(meta.capability_entries());

        let rendered = render(&state, &meta);
        assert!(rendered.keys().all(|k| !is_meta_key(k)));
        assert_eq!(rendered["Name"], json!("chassis"));
        assert_eq!(rendered["@odata.id"], json!("/redfish/v1/Systems/1"));
    }

    #[test]
    fn test_setter_may_reject() {
        let state = state_with(json!({"SessionTimeout": 30}), &[]);
        let meta = MetaTable::new().with(
            "SessionTimeout",
            MetaDescriptor::new().with_setter(validators::integer_range(30, 86400)),
        );

        let err = resolve_set(&state, &meta, "SessionTimeout", &json!(5)).unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::OutOfRange);

        let ok = resolve_set(&state, &meta, "SessionTimeout", &json!(600.0)).unwrap();
        assert_eq!(ok, Some(json!(600)));
    }

    #[test]
    fn test_unchanged_write_yields_none() {
        let state = state_with(json!({"AssetTag": "A1"}), &["AssetTag"]);
        let meta = MetaTable::new();

        assert_eq!(resolve_set(&state, &meta, "AssetTag", &json!("A1")).unwrap(), None);
    }

    #[test]
    fn test_raw_write_requires_writable_schema() {
        let state = state_with(json!({"Id": "1", "HostName": "a"}), &["HostName"]);
        let meta = MetaTable::new();

        assert_eq!(
            resolve_set(&state, &meta, "Id", &json!("2")).unwrap_err().kind,
            FieldErrorKind::ReadOnly
        );
        assert_eq!(
            resolve_set(&state, &meta, "Nope", &json!(1)).unwrap_err().kind,
            FieldErrorKind::UnknownProperty
        );
        assert_eq!(
            resolve_set(&state, &meta, "HostName", &json!(7)).unwrap_err().kind,
            FieldErrorKind::TypeMismatch
        );
        assert_eq!(
            resolve_set(&state, &meta, "HostName", &json!("b")).unwrap(),
            Some(json!("b"))
        );
    }

    #[test]
    fn test_meta_keys_are_not_writable() {
        let state = state_with(json!({}), &["Name@meta"]);
        let err = resolve_set(&state, &MetaTable::new(), "Name@meta", &json!({})).unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::UnknownProperty);
    }

    #[test]
    fn test_descriptors_are_resource_local() {
        let a = state_with(json!({"Name": "x"}), &[]);
        let b = state_with(json!({"Name": "x"}), &[]);
        let meta_a = MetaTable::new().with("Name", MetaDescriptor::new().with_getter(|_| json!("A")));
        let meta_b = MetaTable::new();

        assert_eq!(resolve_get(&process_meta(&a), &meta_a, "Name"), Some(json!("A")));
        assert_eq!(resolve_get(&process_meta(&b), &meta_b, "Name"), Some(json!("x")));
    }

    #[test]
    fn test_collection_view_lists_members() {
        let mut state = state_with(json!({"Name": "Sessions"}), &[]);
        state.collection = true;
        state.members = vec![
            crate::aggregate::MemberRef {
                id: Uuid::now_v7(),
                uri: "/redfish/v1/SessionService/Sessions/a".to_string(),
            },
        ];

        let view = process_meta(&state);
        assert_eq!(view["Members@odata.count"], json!(1));
        assert_eq!(
            view["Members"][0]["@odata.id"],
            json!("/redfish/v1/SessionService/Sessions/a")
        );
    }
}
