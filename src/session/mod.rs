// Copyright (c) 2025 - Cowboy AI, Inc.
//! Session & Token Subsystem
//!
//! A session is an ordinary resource aggregate under the Sessions collection
//! whose state carries a [`SessionLease`]. A token is a signed claim set that
//! points at a session URI; it is valid only while the signature checks out
//! *and* the referenced session is live and inside its idle window.
//!
//! ```text
//! X-Auth-Token ─verify─▶ claims ─lookup─▶ session aggregate
//!                                             │ Active?
//!                         SessionTokenRefreshed ◀─┘
//!                                             │
//!                             CallerIdentity(user, privileges)
//! ```
//!
//! Any failure along the way yields an anonymous caller; the privilege gate
//! decides what an anonymous caller may do.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::StateMachine;

pub mod lifecycle;
pub mod manager;
pub mod token;
pub mod users;

pub use lifecycle::{SessionInput, SessionStatus};
pub use manager::{spawn_session_reaper, SessionFactory, SessionManager};
pub use token::{SessionClaims, TokenError, TokenSigner};
pub use users::{StaticUserDirectory, UserDirectory};

/// Session service resource
pub const SESSION_SERVICE_URI: &str = "/redfish/v1/SessionService";

/// Sessions collection
pub const SESSIONS_URI: &str = "/redfish/v1/SessionService/Sessions";

/// Session service property holding the idle timeout in seconds
pub const SESSION_TIMEOUT_PROPERTY: &str = "SessionTimeout";

/// Login data carried by a session aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLease {
    pub username: String,
    pub privileges: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_refreshed: DateTime<Utc>,
}

impl SessionLease {
    pub fn new(
        username: impl Into<String>,
        privileges: BTreeSet<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            privileges,
            created_at,
            last_refreshed: created_at,
        }
    }

    pub fn expires_at(&self, timeout: Duration) -> DateTime<Utc> {
        self.last_refreshed + timeout
    }

    /// Lifecycle state at `now`
    pub fn status(&self, now: DateTime<Utc>, timeout: Duration, revoked: bool) -> SessionStatus {
        if revoked {
            return SessionStatus::Revoked;
        }
        let active = SessionStatus::Active {
            expires_at: self.expires_at(timeout),
        };
        active
            .transition(&SessionInput::Tick { now })
            .map(|(status, _)| status)
            .unwrap_or(SessionStatus::Expired)
    }
}
