// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for the Redfish Resource Tree
//!
//! This module provides the application service layer that orchestrates
//! authentication, the privilege gate, pure command handlers, the event
//! store and the event bus.
//!
//! # Architecture
//!
//! ```text
//! Client Request
//!     ↓
//! ProtocolRequest (transport neutral)
//!     ↓
//! Service Layer (this module)
//!     ↓
//! Command Handler → Aggregate → Event
//!     ↓
//! Event Store (in-memory or JetStream)
//!     ↓
//! Event Bus (observers)
//! ```
//!
//! # Design Principles
//!
//! 1. **Transaction Boundaries**: one aggregate write guard per command
//! 2. **Pure Domain Logic**: services call pure handlers with explicit time
//! 3. **Async by Default**: all I/O is asynchronous
//!
//! # Example
//!
//! ```rust,ignore
//! use cim_redfish::config::EngineConfig;
//! use cim_redfish::service::{ProtocolRequest, RedfishService};
//!
//! let service = RedfishService::builder(EngineConfig::default()).build();
//! cim_redfish::bootstrap::install(&service, &settings).await?;
//!
//! let response = service
//!     .handle_request(ProtocolRequest::new("GET", "/redfish/v1"))
//!     .await;
//! assert_eq!(response.status_code, 200);
//! ```

pub mod action;
pub mod factory;
pub mod protocol;
pub mod resource;

pub use action::{allowable_parameter, ActionHandler, ActionRequest, RegisteredAction};
pub use factory::{GenericMemberFactory, MemberFactory, MemberRequest, NewMember};
pub use protocol::{CommandResponse, ProtocolRequest};
pub use resource::{RedfishService, ServiceBuilder, EXTENDED_INFO};
