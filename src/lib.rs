// Copyright (c) 2025 - Cowboy AI, Inc.
//! Redfish resource engine for the Composable Information Machine
//!
//! This crate provides an event-sourced resource tree for hardware
//! management: per-property meta behaviour (getters, setters, formatters),
//! collections, a per-verb privilege gate, and session bearer tokens.

pub mod aggregate;
pub mod bootstrap;
pub mod bus;
pub mod clock;
pub mod config;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod meta;
pub mod privilege;
pub mod service;
pub mod session;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use aggregate::{AggregateStore, ResourceState};
pub use config::{EngineConfig, Settings};
pub use errors::{EngineError, EngineResult, FieldError, FieldErrorKind};
pub use events::ResourceEvent;
pub use privilege::{CallerIdentity, PrivilegeMap, Verb};
pub use service::{CommandResponse, ProtocolRequest, RedfishService};
