// Copyright (c) 2025 - Cowboy AI, Inc.
//! Member factories
//!
//! A POST to a collection is turned into a creation command by the factory
//! registered for that collection. The factory validates the body against the
//! member schema and picks the new member's URI.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::aggregate::{CreateResourceCommand, ResourceState};
use crate::errors::{EngineError, EngineResult, FieldError, FieldErrorKind};
use crate::meta::MetaTable;
use crate::privilege::{CallerIdentity, PrivilegeMap};

/// Inputs available to a factory
#[derive(Debug)]
pub struct MemberRequest<'a> {
    pub collection: &'a ResourceState,
    pub body: &'a Map<String, Value>,
    pub caller: &'a CallerIdentity,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

/// Creation command plus headers for the POST response
#[derive(Debug, Clone)]
pub struct NewMember {
    pub command: CreateResourceCommand,
    pub headers: BTreeMap<String, String>,
}

impl NewMember {
    pub fn new(command: CreateResourceCommand) -> Self {
        Self {
            command,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Builds members for one collection
pub trait MemberFactory: Send + Sync {
    fn build(&self, request: &MemberRequest<'_>) -> EngineResult<NewMember>;
}

/// Schema-driven factory for plain collections
///
/// Members are numbered from 1 upwards; a number is never handed out twice.
#[derive(Debug)]
pub struct GenericMemberFactory {
    resource_type: String,
    context: String,
    privileges: PrivilegeMap,
    required: BTreeSet<String>,
    accepted: BTreeSet<String>,
    writable: BTreeSet<String>,
    meta: MetaTable,
    next_id: AtomicU64,
}

impl GenericMemberFactory {
    pub fn new(resource_type: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            context: context.into(),
            privileges: PrivilegeMap::new(),
            required: BTreeSet::new(),
            accepted: BTreeSet::new(),
            writable: BTreeSet::new(),
            meta: MetaTable::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_privileges(mut self, privileges: PrivilegeMap) -> Self {
        self.privileges = privileges;
        self
    }

    /// Body fields a POST must supply
    pub fn require<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.accepted.insert(name.clone());
            self.required.insert(name);
        }
        self
    }

    /// Body fields a POST may supply
    pub fn accept<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted.extend(names.into_iter().map(Into::into));
        self
    }

    /// Fields later writable by PATCH
    pub fn writable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_meta(mut self, meta: MetaTable) -> Self {
        self.meta = meta;
        self
    }

    fn allocate(&self, collection: &ResourceState) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            let uri = format!("{}/{}", collection.uri, n);
            if !collection.members.iter().any(|m| m.uri == uri) {
                return n.to_string();
            }
        }
    }
}

impl MemberFactory for GenericMemberFactory {
    fn build(&self, request: &MemberRequest<'_>) -> EngineResult<NewMember> {
        let mut errors: Vec<FieldError> = request
            .body
            .keys()
            .filter(|k| !self.accepted.contains(*k))
            .map(FieldError::unknown)
            .collect();
        errors.extend(
            self.required
                .iter()
                .filter(|k| !request.body.contains_key(*k))
                .map(|k| {
                    FieldError::new(k, FieldErrorKind::MalformedBody, format!("{} is required", k))
                }),
        );
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        let id = self.allocate(request.collection);
        let mut properties = request.body.clone();
        properties.insert("Id".to_string(), Value::String(id.clone()));

        let command = CreateResourceCommand::new(
            format!("{}/{}", request.collection.uri, id),
            &self.resource_type,
            &self.context,
            request.timestamp,
            request.correlation_id,
        )
        .with_properties(Value::Object(properties))
        .with_privileges(self.privileges.clone())
        .writable(self.writable.iter().cloned())
        .with_meta(self.meta.clone());

        Ok(NewMember::new(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::Verb;
    use serde_json::json;

    fn collection() -> ResourceState {
        let mut state = ResourceState::default_for(Uuid::now_v7());
        state.uri = "/redfish/v1/Systems".to_string();
        state.collection = true;
        state
    }

    #[test]
    fn test_generic_factory_numbers_members() {
        let factory = GenericMemberFactory::new("#ComputerSystem", "/ctx")
            .require(["Name"])
            .with_privileges(PrivilegeMap::new().allow(Verb::Get, ["Login"]));
        let collection = collection();
        let body = json!({"Name": "node"}).as_object().cloned().unwrap();
        let caller = CallerIdentity::internal();
        let request = MemberRequest {
            collection: &collection,
            body: &body,
            caller: &caller,
            timestamp: Utc::now(),
            correlation_id: Uuid::now_v7(),
        };

        let first = factory.build(&request).unwrap();
        let second = factory.build(&request).unwrap();
        assert_eq!(first.command.uri, "/redfish/v1/Systems/1");
        assert_eq!(second.command.uri, "/redfish/v1/Systems/2");
        assert_eq!(first.command.properties["Id"], json!("1"));
    }

    #[test]
    fn test_generic_factory_validates_body() {
        let factory = GenericMemberFactory::new("#T", "/ctx").require(["Name"]);
        let collection = collection();
        let body = json!({"Bogus": 1}).as_object().cloned().unwrap();
        let caller = CallerIdentity::anonymous();
        let request = MemberRequest {
            collection: &collection,
            body: &body,
            caller: &caller,
            timestamp: Utc::now(),
            correlation_id: Uuid::now_v7(),
        };

        match factory.build(&request) {
            Err(EngineError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other.map(|m| m.command.uri)),
        }
    }
}
