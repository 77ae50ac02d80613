// Copyright (c) 2025 - Cowboy AI, Inc.
//! Redfish Resource Service
//!
//! Coordinates one request end to end:
//!
//! ```text
//! ProtocolRequest → authenticate → resolve URI → privilege gate
//!                         ↓
//!      write guard → pure handler → append → fold → release
//!                         ↓
//!                 publish committed events
//! ```
//!
//! # Transaction Semantics
//!
//! Each verb is a transaction on one aggregate (two for POST and DELETE,
//! always locked collection-first or child-then-parent, never both ways).
//! A rejected request records nothing. Publication happens after the
//! append and does not roll back on failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::action::{ActionHandler, ActionRequest, RegisteredAction};
use super::factory::{MemberFactory, MemberRequest};
use super::protocol::{CommandResponse, ProtocolRequest};
use crate::aggregate::store::normalize;
use crate::aggregate::{
    handle_get, handle_patch, handle_update_properties, AggregateStore, CreateResourceCommand,
    DeleteCommand, PatchCommand, ResourceState, ResourceView, UpdatePropertiesCommand,
};
use crate::bus::{publish_committed, EventBus, InMemoryEventBus};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigBinding, EngineConfig, Settings};
use crate::errors::{EngineError, EngineResult, FieldError, FieldErrorKind};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::events::ResourceEvent;
use crate::meta::MetaDescriptor;
use crate::privilege::{self, CallerIdentity, PrivilegeRequirement, Verb, CONFIGURE_SELF};
use crate::session::{
    SessionManager, StaticUserDirectory, TokenSigner, UserDirectory, SESSIONS_URI,
};

/// Key under which partial PATCH failures are reported
pub const EXTENDED_INFO: &str = "@Message.ExtendedInfo";

/// Assembles a [`RedfishService`] with in-memory defaults
pub struct ServiceBuilder {
    config: EngineConfig,
    event_store: Option<Arc<dyn EventStore>>,
    bus: Option<Arc<dyn EventBus>>,
    clock: Option<Arc<dyn Clock>>,
    signer: Option<TokenSigner>,
    users: Option<Arc<dyn UserDirectory>>,
}

impl ServiceBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            event_store: None,
            bus: None,
            clock: None,
            signer: None,
            users: None,
        }
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_signer(mut self, signer: TokenSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn build(self) -> RedfishService {
        let events = self
            .event_store
            .unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let store = Arc::new(AggregateStore::new(events));
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryEventBus::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let signer = self.signer.unwrap_or_else(TokenSigner::generate);
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(StaticUserDirectory::from_config(&self.config.users)));

        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&clock),
            signer,
            users,
            &self.config.session,
        ));

        let mut factories: HashMap<String, Arc<dyn MemberFactory>> = HashMap::new();
        factories.insert(SESSIONS_URI.to_string(), Arc::new(sessions.factory()));

        RedfishService {
            store,
            bus,
            clock,
            sessions,
            factories: RwLock::new(factories),
            actions: RwLock::new(HashMap::new()),
            bindings: RwLock::new(Vec::new()),
            settings: RwLock::new(Settings::new()),
            config: self.config,
        }
    }
}

pub struct RedfishService {
    store: Arc<AggregateStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionManager>,
    factories: RwLock<HashMap<String, Arc<dyn MemberFactory>>>,
    actions: RwLock<HashMap<String, RegisteredAction>>,
    bindings: RwLock<Vec<ConfigBinding>>,
    /// Last applied settings plus client changes to bound properties
    settings: RwLock<Settings>,
    config: EngineConfig,
}

impl RedfishService {
    pub fn builder(config: EngineConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Authenticate, dispatch by verb, and render errors as Redfish bodies
    #[instrument(skip(self, request), fields(method = %request.method, uri = %request.uri, correlation_id = %request.correlation_id))]
    pub async fn handle_request(&self, request: ProtocolRequest) -> CommandResponse {
        let ProtocolRequest {
            method,
            uri,
            headers,
            body,
            correlation_id,
        } = request;

        let caller = self.sessions.authenticate(&headers).await;
        let body = body.unwrap_or_else(|| Value::Object(Map::new()));

        let result = match Verb::parse(&method) {
            Some(Verb::Get) => self.get(&uri, &caller, correlation_id).await,
            Some(Verb::Post) => self.post(&uri, body, &caller, correlation_id).await,
            Some(Verb::Patch) => self.patch(&uri, body, &caller, correlation_id).await,
            Some(Verb::Delete) => self.delete(&uri, &caller, correlation_id).await,
            Some(Verb::Put) | None => Err(EngineError::field(FieldError::new(
                "method",
                FieldErrorKind::MalformedBody,
                format!("method {} is not supported", method),
            ))),
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                debug!(status = err.status_code(), error = %err, "request failed");
                CommandResponse::from_error(&err, correlation_id)
            }
        }
    }

    /// GET: rendered resource with getters and formatters applied
    pub async fn get(
        &self,
        uri: &str,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<CommandResponse> {
        let (_, handle) = self.resolve(uri).await?;
        let aggregate = handle.read().await;
        if !aggregate.state.is_live() {
            return Err(EngineError::NotFound(uri.to_string()));
        }
        self.gate(&aggregate.state, Verb::Get, caller)?;

        let view = handle_get(&aggregate.state, &aggregate.meta)?;
        Ok(ok(correlation_id, 200, view))
    }

    /// POST to a collection builds a member with the collection's factory;
    /// POST to a registered action URI runs the action
    #[instrument(skip(self, body, caller))]
    pub async fn post(
        &self,
        uri: &str,
        body: Value,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<CommandResponse> {
        let body = into_object(body)?;
        let action = self.actions.read().await.get(normalize(uri)).cloned();
        if let Some(action) = action {
            return self.invoke_action(uri, action, body, caller, correlation_id).await;
        }

        let (collection_id, handle) = self.resolve(uri).await?;
        let timestamp = self.clock.now();

        let new_member = {
            let collection = handle.read().await;
            if !collection.state.is_live() {
                return Err(EngineError::NotFound(uri.to_string()));
            }
            self.gate(&collection.state, Verb::Post, caller)?;

            let factory = self
                .factories
                .read()
                .await
                .get(&collection.state.uri)
                .cloned()
                .ok_or_else(|| {
                    EngineError::field(FieldError::new(
                        "@odata.id",
                        FieldErrorKind::MalformedBody,
                        format!("{} does not accept new members", collection.state.uri),
                    ))
                })?;

            factory.build(&MemberRequest {
                collection: &collection.state,
                body: &body,
                caller,
                timestamp,
                correlation_id,
            })?
        };

        let (created, events) = self
            .store
            .create_member(collection_id, new_member.command)
            .await?;
        publish_committed(self.bus.as_ref(), &events).await;

        let member = self
            .store
            .checkout(created.aggregate_id)
            .await
            .ok_or_else(|| EngineError::NotFound(created.resource_uri.clone()))?;
        let member = member.read().await;
        let mut view = handle_get(&member.state, &member.meta)?;
        view.headers
            .insert("Location".to_string(), created.resource_uri.clone());
        view.headers.extend(new_member.headers);

        info!(member = %created.resource_uri, "member created");
        Ok(ok(correlation_id, 201, view))
    }

    async fn invoke_action(
        &self,
        uri: &str,
        action: RegisteredAction,
        body: Map<String, Value>,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<CommandResponse> {
        {
            let (_, handle) = self.resolve(&action.target).await?;
            let target = handle.read().await;
            if !target.state.is_live() {
                return Err(EngineError::NotFound(uri.to_string()));
            }
            self.gate(&target.state, Verb::Post, caller)?;
        }

        let request = ActionRequest {
            target: &action.target,
            body: &body,
            caller,
            correlation_id,
        };
        let result = action.handler.invoke(self, &request).await?;

        info!(action = %uri, "action invoked");
        Ok(CommandResponse::new(
            correlation_id,
            200,
            Some(result),
            BTreeMap::new(),
        ))
    }

    /// PATCH: write each field through its setter or the writable set
    ///
    /// Fields that fail are listed under `@Message.ExtendedInfo` while the
    /// rest apply, unless the resource's patch policy is all-or-nothing.
    #[instrument(skip(self, body, caller))]
    pub async fn patch(
        &self,
        uri: &str,
        body: Value,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<CommandResponse> {
        let body = into_object(body)?;
        let (mut view, errors) = self.patch_resource(uri, body, caller, correlation_id).await?;
        if !errors.is_empty() {
            view.body.insert(
                EXTENDED_INFO.to_string(),
                Value::Array(errors.iter().map(FieldError::to_message).collect()),
            );
        }
        Ok(ok(correlation_id, 200, view))
    }

    /// DELETE: tombstone the resource and detach it from its collection
    ///
    /// A retry of a delete that already committed is answered from the event
    /// log and never touches whatever now lives at the URI.
    #[instrument(skip(self, caller))]
    pub async fn delete(
        &self,
        uri: &str,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<CommandResponse> {
        if self.store.removed_by(uri, correlation_id).await? {
            debug!(%uri, "delete already committed");
            return Ok(CommandResponse::new(correlation_id, 204, None, BTreeMap::new()));
        }

        let (id, handle) = self.resolve(uri).await?;
        {
            let aggregate = handle.read().await;
            if !aggregate.state.is_live() {
                return Err(EngineError::NotFound(uri.to_string()));
            }
            self.gate(&aggregate.state, Verb::Delete, caller)?;
        }

        let command = DeleteCommand {
            caller: caller.clone(),
            timestamp: self.clock.now(),
            correlation_id,
        };
        let events = self.store.remove(id, &command).await?;
        publish_committed(self.bus.as_ref(), &events).await;

        Ok(CommandResponse::new(correlation_id, 204, None, BTreeMap::new()))
    }

    /// Create a resource outside any collection
    pub async fn create_resource(&self, command: CreateResourceCommand) -> EngineResult<Uuid> {
        let created = self.store.create(command).await?;
        let id = created.aggregate_id;
        publish_committed(self.bus.as_ref(), &[ResourceEvent::ResourceCreated(created)]).await;
        Ok(id)
    }

    /// Create a resource and list it in an existing collection
    pub async fn link_member(
        &self,
        collection_uri: &str,
        command: CreateResourceCommand,
    ) -> EngineResult<Uuid> {
        let (collection_id, _) = self.resolve(collection_uri).await?;
        let (created, events) = self.store.create_member(collection_id, command).await?;
        publish_committed(self.bus.as_ref(), &events).await;
        Ok(created.aggregate_id)
    }

    /// Raw property writes from inside the engine (sensor polls, clocks)
    ///
    /// Bypasses setters, the writable set and the privilege gate. Returns
    /// how many properties actually changed.
    pub async fn update_properties(&self, uri: &str, properties: Value) -> EngineResult<usize> {
        let properties = into_object(properties)?;
        let (_, handle) = self.resolve(uri).await?;

        let events: Vec<ResourceEvent> = {
            let mut aggregate = handle.write().await;
            let command = UpdatePropertiesCommand {
                properties,
                timestamp: self.clock.now(),
                correlation_id: Uuid::now_v7(),
            };
            let events: Vec<ResourceEvent> = handle_update_properties(&aggregate.state, &command)?
                .into_iter()
                .map(ResourceEvent::PropertyChanged)
                .collect();
            self.store.commit(&mut aggregate, events.clone()).await?;
            events
        };

        publish_committed(self.bus.as_ref(), &events).await;
        Ok(events.len())
    }

    /// Attach or replace a property's meta descriptor
    pub async fn register_meta(
        &self,
        uri: &str,
        property: &str,
        descriptor: MetaDescriptor,
    ) -> EngineResult<()> {
        let (id, _) = self.resolve(uri).await?;
        if let Some(event) = self
            .store
            .register_meta(id, property, descriptor, self.clock.now())
            .await?
        {
            publish_committed(self.bus.as_ref(), &[event]).await;
        }
        Ok(())
    }

    /// Route POSTs on `collection_uri` to `factory`
    pub async fn register_member_factory(
        &self,
        collection_uri: &str,
        factory: Arc<dyn MemberFactory>,
    ) {
        self.factories
            .write()
            .await
            .insert(normalize(collection_uri).to_string(), factory);
    }

    /// Route POSTs on `action_uri` to `handler`, gated by `target`'s POST privileges
    pub async fn register_action(
        &self,
        action_uri: &str,
        target: &str,
        handler: Arc<dyn ActionHandler>,
    ) {
        self.actions.write().await.insert(
            normalize(action_uri).to_string(),
            RegisteredAction {
                target: normalize(target).to_string(),
                handler,
            },
        );
    }

    /// Tie a settings key to a resource property for [`apply_settings`](Self::apply_settings)
    pub async fn add_binding(&self, binding: ConfigBinding) {
        self.bindings.write().await.push(binding);
    }

    pub async fn bindings(&self) -> Vec<ConfigBinding> {
        self.bindings.read().await.clone()
    }

    /// Current settings, including client changes to bound properties
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Push bound settings into their properties
    ///
    /// Each resource gets one internal PATCH, so values pass the same setters
    /// a client write would. Rejected values are returned and logged; the
    /// rest apply.
    #[instrument(skip_all)]
    pub async fn apply_settings(&self, settings: &Settings) -> Vec<FieldError> {
        self.settings.write().await.merge(settings.clone());

        let mut bodies: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for binding in self.bindings.read().await.iter() {
            if let Some(value) = settings.get(&binding.key) {
                bodies
                    .entry(binding.uri.clone())
                    .or_default()
                    .insert(binding.property.clone(), value.clone());
            }
        }

        let caller = CallerIdentity::internal();
        let mut rejected = Vec::new();
        for (uri, body) in bodies {
            match self.patch_resource(&uri, body, &caller, Uuid::now_v7()).await {
                Ok((_, errors)) => rejected.extend(errors),
                Err(EngineError::Validation(errors)) => rejected.extend(errors),
                Err(err) => {
                    warn!(%uri, error = %err, "settings not applied");
                    rejected.push(FieldError::new(
                        uri,
                        FieldErrorKind::InvalidValue,
                        err.to_string(),
                    ));
                }
            }
        }

        for err in &rejected {
            warn!(property = %err.property, reason = %err.reason, "setting rejected");
        }
        rejected
    }

    async fn patch_resource(
        &self,
        uri: &str,
        body: Map<String, Value>,
        caller: &CallerIdentity,
        correlation_id: Uuid,
    ) -> EngineResult<(ResourceView, Vec<FieldError>)> {
        let (_, handle) = self.resolve(uri).await?;
        let mut aggregate = handle.write().await;
        if !aggregate.state.is_live() {
            return Err(EngineError::NotFound(uri.to_string()));
        }
        self.gate(&aggregate.state, Verb::Patch, caller)?;

        let command = PatchCommand {
            body,
            caller: caller.clone(),
            timestamp: self.clock.now(),
            correlation_id,
        };
        let outcome = handle_patch(&aggregate.state, &aggregate.meta, &command)?;
        self.store
            .commit(&mut aggregate, outcome.events.clone())
            .await?;
        let view = handle_get(&aggregate.state, &aggregate.meta)?;
        drop(aggregate);

        publish_committed(self.bus.as_ref(), &outcome.events).await;
        if !caller.is_internal() {
            self.write_back(uri, &outcome.events).await;
        }
        Ok((view, outcome.errors))
    }

    /// Record client changes to bound properties in the settings, and dump
    /// them to the configured file when enabled
    async fn write_back(&self, uri: &str, events: &[ResourceEvent]) {
        let uri = normalize(uri);
        let changed: Vec<(String, Value)> = {
            let bindings = self.bindings.read().await;
            events
                .iter()
                .filter_map(|event| match event {
                    ResourceEvent::PropertyChanged(changed) => Some(changed),
                    _ => None,
                })
                .filter_map(|changed| {
                    bindings
                        .iter()
                        .find(|b| normalize(&b.uri) == uri && b.property == changed.property)
                        .map(|b| (b.key.clone(), changed.value.clone()))
                })
                .collect()
        };
        if changed.is_empty() {
            return;
        }

        // Held through the write so dumps land in commit order
        let mut settings = self.settings.write().await;
        for (key, value) in changed {
            debug!(%key, %value, "setting changed by client");
            settings.set(key, value);
        }
        if !self.config.dump.enabled {
            return;
        }

        let filename = &self.config.dump.filename;
        let written = match settings.to_toml_string() {
            Ok(document) => tokio::fs::write(filename, document)
                .await
                .map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match written {
            Ok(()) => debug!(%filename, "configuration changes written"),
            Err(error) => warn!(%filename, %error, "failed to write configuration changes"),
        }
    }

    async fn resolve(&self, uri: &str) -> EngineResult<(Uuid, crate::aggregate::AggregateHandle)> {
        self.store
            .resolve(uri)
            .await
            .ok_or_else(|| EngineError::NotFound(uri.to_string()))
    }

    /// Privilege gate plus session ownership
    fn gate(&self, state: &ResourceState, verb: Verb, caller: &CallerIdentity) -> EngineResult<()> {
        privilege::check(state, verb, caller)?;
        check_ownership(state, verb, caller)
    }
}

/// A caller admitted to a session only through `ConfigureSelf` must own it
fn check_ownership(state: &ResourceState, verb: Verb, caller: &CallerIdentity) -> EngineResult<()> {
    let (Some(lease), Some(requirement)) = (&state.session, state.privileges.requirement(verb))
    else {
        return Ok(());
    };
    if caller.is_internal() || !requirement.privileges().iter().any(|p| p == CONFIGURE_SELF) {
        return Ok(());
    }

    let others: Vec<String> = requirement
        .privileges()
        .iter()
        .filter(|p| *p != CONFIGURE_SELF)
        .cloned()
        .collect();
    let elevated = matches!(requirement, PrivilegeRequirement::AnyOf(_))
        && others.iter().any(|p| caller.holds(p));
    let owner = caller.username.as_deref() == Some(lease.username.as_str());

    if elevated || owner {
        return Ok(());
    }
    Err(EngineError::Unauthorized {
        verb,
        uri: state.uri.clone(),
        required: others,
    })
}

fn into_object(body: Value) -> EngineResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(EngineError::field(FieldError::new(
            "body",
            FieldErrorKind::MalformedBody,
            format!("expected a JSON object, got {}", crate::meta::json_type_name(&other)),
        ))),
    }
}

fn ok(correlation_id: Uuid, status: u16, view: ResourceView) -> CommandResponse {
    CommandResponse::new(
        correlation_id,
        status,
        Some(Value::Object(view.body)),
        view.headers,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{PrivilegeMap, CONFIGURE_MANAGER};
    use crate::session::SessionLease;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn session_state() -> ResourceState {
        let mut state = ResourceState::default_for(Uuid::now_v7());
        state.uri = format!("{}/abc", SESSIONS_URI);
        state.privileges =
            PrivilegeMap::new().allow(Verb::Get, [CONFIGURE_MANAGER, CONFIGURE_SELF]);
        state.session = Some(SessionLease::new("alice", BTreeSet::new(), Utc::now()));
        state
    }

    #[test]
    fn test_configure_self_requires_ownership() {
        let state = session_state();
        let owner = CallerIdentity::user("alice", [CONFIGURE_SELF]);
        let stranger = CallerIdentity::user("bob", [CONFIGURE_SELF]);
        let admin = CallerIdentity::user("root", [CONFIGURE_MANAGER]);

        assert!(check_ownership(&state, Verb::Get, &owner).is_ok());
        assert!(check_ownership(&state, Verb::Get, &admin).is_ok());
        assert!(matches!(
            check_ownership(&state, Verb::Get, &stranger),
            Err(EngineError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_non_object_body_is_malformed() {
        match into_object(Value::from(3)) {
            Err(EngineError::Validation(errors)) => {
                assert_eq!(errors[0].kind, FieldErrorKind::MalformedBody)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
