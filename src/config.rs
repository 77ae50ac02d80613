// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration
//!
//! The engine consumes settings as a flat key/value map with dotted keys
//! (`session.timeout`, `chassis.1.model`). Nested TOML tables flatten into
//! that form; arrays stay whole.
//!
//! ```toml
//! [session]
//! timeout = 600
//!
//! [[users]]
//! username = "root"
//! password = "calvin"
//! role = "Administrator"
//!
//! [main.log]
//! level = "info"
//! modules = { "cim_redfish::session" = "debug" }
//!
//! [main.dumpConfigChanges]
//! enabled = true
//! filename = "redfish-changed.toml"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::privilege::{
    CONFIGURE_COMPONENTS, CONFIGURE_MANAGER, CONFIGURE_SELF, CONFIGURE_USERS, LOGIN,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Flat dotted-key settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Value>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let document: toml::Value = toml::from_str(source)?;
        let json = serde_json::to_value(document).map_err(|e| ConfigError::Invalid {
            key: "<document>".to_string(),
            reason: e.to_string(),
        })?;

        let mut settings = Self::new();
        if let Value::Object(map) = json {
            settings.flatten_into("", map);
        }
        Ok(settings)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn flatten_into(&mut self, prefix: &str, map: Map<String, Value>) {
        for (key, value) in map {
            let key = if prefix.is_empty() {
                key
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                Value::Object(inner) => self.flatten_into(&key, inner),
                other => {
                    self.0.insert(key, other);
                }
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Entries under `prefix.`, keyed by the remainder
    pub fn section(&self, prefix: &str) -> BTreeMap<String, Value> {
        let prefix = format!("{}.", prefix);
        self.0
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }

    /// Overlay `other` on top of this
    pub fn merge(&mut self, other: Settings) {
        self.0.extend(other.0);
    }

    /// Nested TOML document; null values are left out
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let mut root = Map::new();
        for (key, value) in &self.0 {
            if value.is_null() {
                continue;
            }
            let mut path: Vec<&str> = key.split('.').collect();
            let Some(leaf) = path.pop() else {
                continue;
            };
            let mut table = &mut root;
            for part in path {
                table = table
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::Invalid {
                        key: key.clone(),
                        reason: format!("{} is already a value", part),
                    })?;
            }
            table.insert(leaf.to_string(), value.clone());
        }

        toml::to_string_pretty(&Value::Object(root)).map_err(|e| ConfigError::Invalid {
            key: "<document>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Operator,
    ReadOnly,
}

impl Role {
    pub fn privileges(&self) -> BTreeSet<String> {
        let names: &[&str] = match self {
            Role::Administrator => &[
                LOGIN,
                CONFIGURE_MANAGER,
                CONFIGURE_USERS,
                CONFIGURE_COMPONENTS,
                CONFIGURE_SELF,
            ],
            Role::Operator => &[LOGIN, CONFIGURE_COMPONENTS, CONFIGURE_SELF],
            Role::ReadOnly => &[LOGIN, CONFIGURE_SELF],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle timeout in seconds
    pub timeout: u64,
    /// Token `exp` offset in seconds
    pub token_lifetime: u64,
    /// Seconds between reaper passes
    pub reap_interval: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            token_lifetime: 86_400,
            reap_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global level
    pub level: String,
    /// Module path → level overrides
    pub modules: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string: global level, then per-module overrides
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(
                self.modules
                    .iter()
                    .map(|(module, level)| format!("{}={}", module, level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Where client changes to bound settings are written back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpConfig {
    pub enabled: bool,
    pub filename: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "redfish-changed.toml".to_string(),
        }
    }
}

impl DumpConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let mut dump = Self::default();
        if let Some(enabled) = settings.get("main.dumpConfigChanges.enabled") {
            dump.enabled = enabled.as_bool().ok_or_else(|| ConfigError::Invalid {
                key: "main.dumpConfigChanges.enabled".to_string(),
                reason: format!("expected a boolean, got {}", enabled),
            })?;
        }
        if let Some(filename) = settings.get_str("main.dumpConfigChanges.filename") {
            dump.filename = filename.to_string();
        }
        Ok(dump)
    }
}

/// Typed view of the settings the engine itself uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub users: Vec<UserConfig>,
    pub log: LogConfig,
    pub dump: DumpConfig,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let defaults = SessionConfig::default();
        let session = SessionConfig {
            timeout: read_u64(settings, "session.timeout", defaults.timeout)?,
            token_lifetime: read_u64(settings, "session.token_lifetime", defaults.token_lifetime)?,
            reap_interval: read_u64(settings, "session.reap_interval", defaults.reap_interval)?,
        };

        let users = match settings.get("users") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| ConfigError::Invalid {
                key: "users".to_string(),
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };

        let mut log = LogConfig::default();
        if let Some(level) = settings.get_str("main.log.level") {
            log.level = level.to_string();
        }
        for (module, level) in settings.section("main.log.modules") {
            let level = level.as_str().ok_or_else(|| ConfigError::Invalid {
                key: format!("main.log.modules.{}", module),
                reason: "expected a level name".to_string(),
            })?;
            log.modules.insert(module, level.to_string());
        }

        Ok(Self {
            session,
            users,
            log,
            dump: DumpConfig::from_settings(settings)?,
        })
    }
}

fn read_u64(settings: &Settings, key: &str, default: u64) -> Result<u64, ConfigError> {
    match settings.get(key) {
        None => Ok(default),
        Some(value) => value.as_u64().ok_or_else(|| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got {}", value),
        }),
    }
}

/// Settings key → resource property, re-applied on reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBinding {
    pub key: String,
    pub uri: String,
    pub property: String,
}

impl ConfigBinding {
    pub fn new(
        key: impl Into<String>,
        uri: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            uri: uri.into(),
            property: property.into(),
        }
    }
}
