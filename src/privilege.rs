// Copyright (c) 2025 - Cowboy AI, Inc.
//! Privilege Gate
//!
//! Every resource declares, per HTTP verb, which privileges a caller must hold.
//! The gate is evaluated fresh for every command, before any handler touches
//! state.
//!
//! ```text
//! PrivilegeMap { GET: AnyOf[Login], PATCH: AnyOf[ConfigureManager] }
//!                      ↓
//! authorize(state, verb, caller) → bool
//! ```
//!
//! A requirement is either *any-of* (caller needs one listed privilege) or
//! *all-of* (caller needs every listed privilege). An empty list is public, as
//! is a list naming only [`UNAUTHENTICATED`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::ResourceState;
use crate::errors::{EngineError, EngineResult};

/// Implicit privilege held by every caller, identified or not
pub const UNAUTHENTICATED: &str = "Unauthenticated";
pub const LOGIN: &str = "Login";
pub const CONFIGURE_MANAGER: &str = "ConfigureManager";
pub const CONFIGURE_USERS: &str = "ConfigureUsers";
pub const CONFIGURE_COMPONENTS: &str = "ConfigureComponents";
pub const CONFIGURE_SELF: &str = "ConfigureSelf";

/// Protocol verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Parse an HTTP method name (case-insensitive)
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }

    /// Whether the verb may change aggregate state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Get)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceptable privilege combination for one verb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "privileges", rename_all = "snake_case")]
pub enum PrivilegeRequirement {
    /// Caller needs at least one of the listed privileges
    AnyOf(Vec<String>),
    /// Caller needs every listed privilege
    AllOf(Vec<String>),
}

impl PrivilegeRequirement {
    pub fn any_of<I, S>(privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PrivilegeRequirement::AnyOf(privileges.into_iter().map(Into::into).collect())
    }

    pub fn all_of<I, S>(privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PrivilegeRequirement::AllOf(privileges.into_iter().map(Into::into).collect())
    }

    /// Publicly accessible requirement
    pub fn public() -> Self {
        PrivilegeRequirement::AnyOf(Vec::new())
    }

    pub fn privileges(&self) -> &[String] {
        match self {
            PrivilegeRequirement::AnyOf(p) | PrivilegeRequirement::AllOf(p) => p,
        }
    }

    /// Empty, or naming only the implicit `Unauthenticated` privilege
    pub fn is_public(&self) -> bool {
        self.privileges().iter().all(|p| p == UNAUTHENTICATED)
    }

    /// Check a caller's privilege set against this requirement
    pub fn is_satisfied_by(&self, held: &BTreeSet<String>) -> bool {
        if self.is_public() {
            return true;
        }
        match self {
            PrivilegeRequirement::AnyOf(required) => required
                .iter()
                .any(|p| p == UNAUTHENTICATED || held.contains(p)),
            PrivilegeRequirement::AllOf(required) => required
                .iter()
                .all(|p| p == UNAUTHENTICATED || held.contains(p)),
        }
    }
}

/// Verb → requirement mapping declared at resource creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegeMap(BTreeMap<Verb, PrivilegeRequirement>);

impl PrivilegeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require any one of `privileges` for `verb`; empty means public
    pub fn allow<I, S>(mut self, verb: Verb, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.insert(verb, PrivilegeRequirement::any_of(privileges));
        self
    }

    /// Require every one of `privileges` for `verb`
    pub fn require_all<I, S>(mut self, verb: Verb, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.insert(verb, PrivilegeRequirement::all_of(privileges));
        self
    }

    pub fn public(mut self, verb: Verb) -> Self {
        self.0.insert(verb, PrivilegeRequirement::public());
        self
    }

    pub fn requirement(&self, verb: Verb) -> Option<&PrivilegeRequirement> {
        self.0.get(&verb)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Who is issuing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    /// No valid token was presented
    Anonymous,
    /// Authenticated through a session token
    User,
    /// Trusted in-process producer (bootstrap, pollers, config reload)
    Internal,
}

/// Caller identity attached to a command after authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub kind: CallerKind,
    pub username: Option<String>,
    pub privileges: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self {
            kind: CallerKind::Anonymous,
            username: None,
            privileges: BTreeSet::new(),
        }
    }

    pub fn user<I, S>(username: impl Into<String>, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: CallerKind::User,
            username: Some(username.into()),
            privileges: privileges.into_iter().map(Into::into).collect(),
        }
    }

    pub fn internal() -> Self {
        Self {
            kind: CallerKind::Internal,
            username: Some("internal".to_string()),
            privileges: BTreeSet::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind == CallerKind::Anonymous
    }

    pub fn is_internal(&self) -> bool {
        self.kind == CallerKind::Internal
    }

    pub fn holds(&self, privilege: &str) -> bool {
        self.privileges.contains(privilege)
    }
}

/// Decide whether `caller` may perform `verb` on the resource
///
/// A verb absent from the resource's privilege map is denied.
pub fn authorize(state: &ResourceState, verb: Verb, caller: &CallerIdentity) -> bool {
    if caller.is_internal() {
        return true;
    }
    match state.privileges.requirement(verb) {
        Some(requirement) => requirement.is_satisfied_by(&caller.privileges),
        None => false,
    }
}

/// [`authorize`], converted into the error the caller should see
pub fn check(state: &ResourceState, verb: Verb, caller: &CallerIdentity) -> EngineResult<()> {
    if authorize(state, verb, caller) {
        return Ok(());
    }

    tracing::debug!(
        uri = %state.uri,
        %verb,
        user = caller.username.as_deref().unwrap_or("<anonymous>"),
        "privilege check failed"
    );

    if caller.is_anonymous() {
        return Err(EngineError::Unauthenticated {
            verb,
            uri: state.uri.clone(),
        });
    }

    let required = state
        .privileges
        .requirement(verb)
        .map(|r| r.privileges().to_vec())
        .unwrap_or_default();
    Err(EngineError::Unauthorized {
        verb,
        uri: state.uri.clone(),
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(privileges: &[&str]) -> BTreeSet<String> {
        privileges.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_any_of_needs_one() {
        let req = PrivilegeRequirement::any_of([CONFIGURE_MANAGER, CONFIGURE_SELF]);
        assert!(req.is_satisfied_by(&held(&[CONFIGURE_SELF])));
        assert!(!req.is_satisfied_by(&held(&[LOGIN])));
    }

    #[test]
    fn test_all_of_needs_every() {
        let req = PrivilegeRequirement::all_of([LOGIN, CONFIGURE_USERS]);
        assert!(!req.is_satisfied_by(&held(&[LOGIN])));
        assert!(req.is_satisfied_by(&held(&[LOGIN, CONFIGURE_USERS, CONFIGURE_SELF])));
    }

    #[test]
    fn test_unauthenticated_is_public() {
        let req = PrivilegeRequirement::any_of([UNAUTHENTICATED]);
        assert!(req.is_public());
        assert!(req.is_satisfied_by(&BTreeSet::new()));
        assert!(PrivilegeRequirement::public().is_satisfied_by(&BTreeSet::new()));
    }

    #[test]
    fn test_verb_parse() {
        assert_eq!(Verb::parse("patch"), Some(Verb::Patch));
        assert_eq!(Verb::parse("HEAD"), Some(Verb::Get));
        assert_eq!(Verb::parse("TRACE"), None);
        assert!(!Verb::Get.is_mutating());
    }

    #[test]
    fn test_privilege_map_serializes_by_verb() {
        let map = PrivilegeMap::new()
            .allow(Verb::Get, [LOGIN])
            .public(Verb::Post);
        let json = serde_json::to_value(&map).unwrap();

        assert_eq!(json["GET"]["mode"], "any_of");
        assert_eq!(json["GET"]["privileges"][0], "Login");
        assert_eq!(json["POST"]["privileges"].as_array().unwrap().len(), 0);
    }
}
