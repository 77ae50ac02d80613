// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Functional Aggregates
//!
//! This module provides the functional aggregate pattern for event sourcing:
//! - Aggregates are pure functions: State → Command → Result<Event, Error>
//! - State reconstruction via event folding: [Event] → State
//! - All state changes represented as events
//!
//! # Event Sourcing Pattern
//!
//! ```text
//! Command → Aggregate → Events → Event Store
//!    ↓          ↓          ↓
//! Intent   Validation  Facts
//! ```
//!
//! # Fold Pattern
//!
//! ```rust,ignore
//! let initial = ResourceState::default_for(id);
//! let state = events.iter().fold(initial, apply_event);
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use cim_redfish::aggregate::*;
//!
//! let handle = store.checkout(id).await.unwrap();
//! let mut guard = handle.write().await;
//!
//! let outcome = handle_patch(&guard.state, &guard.meta, &command)?;
//! store.commit(&mut guard, outcome.events).await?;
//! ```
//!
//! # Design Principles
//!
//! ## 1. Command-Event Separation
//! - Commands express intent (what should happen)
//! - Events express facts (what did happen)
//! - Commands can fail, events cannot
//!
//! ## 2. Pure Event Application
//! - `apply_event(State, Event) → State`
//! - No validation in event application (already happened)
//!
//! ## 3. Time as Parameter
//! - Handlers never call `Utc::now()`
//! - Timestamp passed explicitly in commands

pub mod commands;
pub mod handlers;
pub mod resource;
pub mod store;

pub use commands::*;
pub use handlers::*;
pub use resource::{apply_event, MemberRef, PatchPolicy, Removal, ResourceState};
pub use store::{AggregateHandle, AggregateStore, ResourceAggregate};
