// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Store
//!
//! Owns every resource aggregate. Each aggregate sits behind its own
//! `tokio::sync::RwLock`: any number of readers, or one writer. There is no
//! store-wide lock around command handling.
//!
//! # Commit Protocol
//!
//! ```text
//! write guard → handler → append(expected_version) → fold → release
//! ```
//!
//! The event store append happens under the aggregate's write guard, so the
//! expected version always matches unless another process shares the log.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::commands::{
    AddMemberCommand, CreateResourceCommand, DeleteCommand, RemoveMemberCommand,
};
use crate::aggregate::handlers::{
    handle_add_member, handle_create_resource, handle_delete, handle_remove_member, CommandError,
};
use crate::aggregate::resource::{apply_event, ResourceState};
use crate::errors::{EngineError, EngineResult};
use crate::event_store::EventStore;
use crate::events::{PropertyChanged, ResourceCreated, ResourceEvent};
use crate::meta::{meta_key, MetaDescriptor, MetaTable};
use crate::privilege::CallerIdentity;

/// State plus resource-local meta descriptors
#[derive(Debug, Clone)]
pub struct ResourceAggregate {
    pub state: ResourceState,
    pub meta: MetaTable,
}

/// Shared handle to one aggregate
pub type AggregateHandle = Arc<RwLock<ResourceAggregate>>;

pub struct AggregateStore {
    events: Arc<dyn EventStore>,
    aggregates: RwLock<HashMap<Uuid, AggregateHandle>>,
    uris: RwLock<HashMap<String, Uuid>>,
}

impl AggregateStore {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self {
            events,
            aggregates: RwLock::new(HashMap::new()),
            uris: RwLock::new(HashMap::new()),
        }
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    /// Aggregate currently bound to `uri`, live or tombstoned
    pub async fn lookup(&self, uri: &str) -> Option<Uuid> {
        self.uris.read().await.get(normalize(uri)).copied()
    }

    pub async fn checkout(&self, id: Uuid) -> Option<AggregateHandle> {
        self.aggregates.read().await.get(&id).cloned()
    }

    /// [`lookup`](Self::lookup) then [`checkout`](Self::checkout)
    pub async fn resolve(&self, uri: &str) -> Option<(Uuid, AggregateHandle)> {
        let id = self.lookup(uri).await?;
        self.checkout(id).await.map(|handle| (id, handle))
    }

    /// Every bound URI
    pub async fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.uris.read().await.keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Create a new aggregate
    ///
    /// Allocates a fresh UUID v7. A URI bound to a removed aggregate is
    /// rebound; a URI bound to a live one is a conflict.
    pub async fn create(&self, command: CreateResourceCommand) -> EngineResult<ResourceCreated> {
        let mut uris = self.uris.write().await;
        let (created, meta) = self.prepare_create(&uris, command).await?;
        self.install_created(&mut uris, &created, meta).await?;
        Ok(created)
    }

    /// Conflict check and pure handler run; nothing is persisted
    async fn prepare_create(
        &self,
        uris: &HashMap<String, Uuid>,
        command: CreateResourceCommand,
    ) -> EngineResult<(ResourceCreated, MetaTable)> {
        let uri = normalize(&command.uri).to_string();

        if let Some(existing) = uris.get(&uri).copied() {
            if let Some(handle) = self.checkout(existing).await {
                if handle.read().await.state.is_live() {
                    return Err(EngineError::Conflict(format!("{} already exists", uri)));
                }
            }
        }

        let id = Uuid::now_v7();
        let command = CreateResourceCommand { uri, ..command };
        let created = handle_create_resource(&ResourceState::default_for(id), &command, id)?;
        Ok((created, command.meta))
    }

    /// Append the creation event, then bind the aggregate and its URI
    async fn install_created(
        &self,
        uris: &mut HashMap<String, Uuid>,
        created: &ResourceCreated,
        meta: MetaTable,
    ) -> EngineResult<()> {
        let id = created.aggregate_id;
        let event = ResourceEvent::ResourceCreated(created.clone());

        self.events.append(id, vec![event.clone()], Some(0)).await?;

        let aggregate = ResourceAggregate {
            state: apply_event(ResourceState::default_for(id), &event),
            meta,
        };
        self.aggregates
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(aggregate)));
        uris.insert(created.resource_uri.clone(), id);

        info!(%id, uri = %created.resource_uri, resource_type = %created.resource_type, "resource created");
        Ok(())
    }

    /// Tombstone a member whose collection never recorded it
    ///
    /// Falls back to unbinding it from memory when the tombstone cannot be
    /// persisted either.
    async fn withdraw(&self, created: &ResourceCreated) {
        let id = created.aggregate_id;
        let Some(handle) = self.checkout(id).await else {
            return;
        };
        let mut member = handle.write().await;
        let command = DeleteCommand {
            caller: CallerIdentity::internal(),
            timestamp: created.timestamp,
            correlation_id: created.correlation_id,
        };

        let tombstoned = match handle_delete(&member.state, &command) {
            Ok(Some(removed)) => self
                .commit(&mut member, vec![ResourceEvent::ResourceRemoved(removed)])
                .await
                .is_ok(),
            Ok(None) => true,
            Err(_) => false,
        };
        drop(member);

        if !tombstoned {
            warn!(%id, uri = %created.resource_uri, "member withdrawn from memory only");
            let mut uris = self.uris.write().await;
            if uris.get(&created.resource_uri) == Some(&id) {
                uris.remove(&created.resource_uri);
            }
            self.aggregates.write().await.remove(&id);
        }
    }

    /// Persist and fold events into an aggregate the caller holds for writing
    ///
    /// Nothing is applied unless the append succeeds.
    pub async fn commit(
        &self,
        aggregate: &mut ResourceAggregate,
        events: Vec<ResourceEvent>,
    ) -> EngineResult<u64> {
        if events.is_empty() {
            return Ok(aggregate.state.version);
        }

        let id = aggregate.state.id;
        let version = self
            .events
            .append(id, events.clone(), Some(aggregate.state.version))
            .await?;

        let state = std::mem::replace(&mut aggregate.state, ResourceState::default_for(id));
        aggregate.state = events.iter().fold(state, apply_event);

        debug!(%id, version, count = events.len(), "committed events");
        Ok(version)
    }

    /// Register or replace a meta descriptor after creation
    ///
    /// Records the descriptor's capability entry with a `PropertyChanged`
    /// when it differs from the stored one.
    pub async fn register_meta(
        &self,
        id: Uuid,
        property: &str,
        descriptor: MetaDescriptor,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<Option<ResourceEvent>> {
        let handle = self
            .checkout(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let mut aggregate = handle.write().await;
        if !aggregate.state.is_live() {
            return Err(EngineError::NotFound(aggregate.state.uri.clone()));
        }

        let key = meta_key(property);
        let capabilities = serde_json::to_value(descriptor.capabilities())?;
        aggregate.meta.register(property, descriptor);

        let previous = aggregate.state.properties.get(&key).cloned();
        if previous.as_ref() == Some(&capabilities) {
            return Ok(None);
        }

        let event = ResourceEvent::PropertyChanged(PropertyChanged {
            event_version: PropertyChanged::CURRENT_VERSION,
            event_id: Uuid::now_v7(),
            aggregate_id: id,
            timestamp,
            correlation_id: Uuid::now_v7(),
            causation_id: None,
            property: key,
            value: capabilities,
            previous,
        });
        self.commit(&mut aggregate, vec![event.clone()]).await?;
        Ok(Some(event))
    }

    /// Create a resource and append it to a collection
    ///
    /// The collection stays write-locked for the whole operation, so members
    /// land in the order their POSTs were serialized.
    pub async fn create_member(
        &self,
        collection_id: Uuid,
        command: CreateResourceCommand,
    ) -> EngineResult<(ResourceCreated, Vec<ResourceEvent>)> {
        let handle = self
            .checkout(collection_id)
            .await
            .ok_or_else(|| EngineError::NotFound(collection_id.to_string()))?;
        let mut collection = handle.write().await;

        if !collection.state.is_live() {
            return Err(EngineError::NotFound(collection.state.uri.clone()));
        }
        if !collection.state.collection {
            return Err(CommandError::NotACollection(collection.state.uri.clone()).into());
        }

        let timestamp = command.timestamp;
        let correlation_id = command.correlation_id;

        // Both handlers run before anything is appended
        let mut uris = self.uris.write().await;
        let (created, meta) = self.prepare_create(&uris, command).await?;
        let add = AddMemberCommand {
            member_id: created.aggregate_id,
            member_uri: created.resource_uri.clone(),
            timestamp,
            correlation_id,
            causation_id: Some(created.event_id),
        };
        let added = handle_add_member(&collection.state, &add)?;

        self.install_created(&mut uris, &created, meta).await?;
        drop(uris);

        let mut events = vec![ResourceEvent::ResourceCreated(created.clone())];
        if let Some(added) = added {
            let added = ResourceEvent::CollectionMemberAdded(added);
            if let Err(err) = self.commit(&mut collection, vec![added.clone()]).await {
                self.withdraw(&created).await;
                return Err(err);
            }
            events.push(added);
        }

        Ok((created, events))
    }

    /// Remove a resource and drop it from its parent collection
    ///
    /// Returns the committed events; empty for a retried delete that already
    /// succeeded.
    pub async fn remove(&self, id: Uuid, command: &DeleteCommand) -> EngineResult<Vec<ResourceEvent>> {
        let handle = self
            .checkout(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let (removed, uri) = {
            let mut aggregate = handle.write().await;
            let Some(removed) = handle_delete(&aggregate.state, command)? else {
                return Ok(Vec::new());
            };
            let removed = ResourceEvent::ResourceRemoved(removed);
            self.commit(&mut aggregate, vec![removed.clone()]).await?;
            (removed, aggregate.state.uri.clone())
        };

        let mut events = vec![removed];
        let Some((_, parent)) = self.resolve(parent_uri(&uri)).await else {
            return Ok(events);
        };

        let mut parent = parent.write().await;
        if parent.state.is_live() && parent.state.collection {
            let detach = RemoveMemberCommand {
                member_id: id,
                timestamp: command.timestamp,
                correlation_id: command.correlation_id,
                causation_id: Some(events[0].event_id()),
            };
            if let Some(dropped) = handle_remove_member(&parent.state, &detach)? {
                let dropped = ResourceEvent::CollectionMemberRemoved(dropped);
                self.commit(&mut parent, vec![dropped.clone()]).await?;
                events.push(dropped);
            }
        }

        info!(%id, %uri, "resource removed");
        Ok(events)
    }

    /// Whether the command correlated by `correlation_id` removed whatever
    /// aggregate was bound to `uri` at the time
    ///
    /// Answered from the event log, so it holds after the URI is rebound.
    pub async fn removed_by(&self, uri: &str, correlation_id: Uuid) -> EngineResult<bool> {
        let uri = normalize(uri);
        let correlated = self.events.read_by_correlation(correlation_id).await?;
        Ok(correlated.iter().any(|stored| {
            matches!(&stored.data, ResourceEvent::ResourceRemoved(e) if e.resource_uri == uri)
        }))
    }

    /// Rebuild state purely from the event log
    pub async fn rehydrate(&self, id: Uuid) -> EngineResult<ResourceState> {
        let stored = self.events.read_events(id).await?;
        if stored.is_empty() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let events: Vec<ResourceEvent> = stored.into_iter().map(|e| e.data).collect();
        Ok(ResourceState::from_events(&events))
    }
}

/// Fold raw event payloads, skipping types this build does not recognize
pub fn fold_payloads(id: Uuid, payloads: impl IntoIterator<Item = Value>) -> ResourceState {
    payloads
        .into_iter()
        .filter_map(ResourceEvent::decode)
        .fold(ResourceState::default_for(id), |state, event| {
            apply_event(state, &event)
        })
}

/// `/a/b/c` → `/a/b`
pub fn parent_uri(uri: &str) -> &str {
    match normalize(uri).rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// URIs compare without a trailing slash
pub fn normalize(uri: &str) -> &str {
    match uri.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => uri,
    }
}
