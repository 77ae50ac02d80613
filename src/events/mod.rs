// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Domain Events
//!
//! Events are the only way aggregate state changes. The event surface
//! published to the bus is:
//!
//! - `ResourceCreated`
//! - `PropertyChanged`
//! - `CollectionMemberAdded` / `CollectionMemberRemoved`
//! - `ResourceRemoved`
//! - `SessionTokenRefreshed`
//!
//! # Event Flow
//!
//! ```text
//! Command → Handler → Event → EventStore → apply_event → Bus
//!  (intent)  (validate) (fact)   (append)     (fold)    (observers)
//! ```

pub mod resource;

pub use resource::{
    CollectionMemberAdded, CollectionMemberRemoved, PropertyChanged, ResourceCreated,
    ResourceEvent, ResourceRemoved, SessionTokenRefreshed,
};
