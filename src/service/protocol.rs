// Copyright (c) 2025 - Cowboy AI, Inc.
//! Transport-neutral request and response records
//!
//! A front end (HTTP server, test harness, CLI) translates its native request
//! into a [`ProtocolRequest`] and writes back the [`CommandResponse`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::aggregate::ODATA_VERSION_HEADER;
use crate::errors::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRequest {
    pub method: String,
    pub uri: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    pub correlation_id: Uuid,
}

impl ProtocolRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: BTreeMap::new(),
            body: None,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Reuse a correlation id, e.g. when retrying a DELETE
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Correlation id of the request that produced this response
    pub command_id: Uuid,
    pub status_code: u16,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl CommandResponse {
    pub fn new(
        command_id: Uuid,
        status_code: u16,
        body: Option<Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            command_id,
            status_code,
            body,
            headers,
        }
    }

    pub fn from_error(err: &EngineError, command_id: Uuid) -> Self {
        let headers = BTreeMap::from([(
            ODATA_VERSION_HEADER.0.to_string(),
            ODATA_VERSION_HEADER.1.to_string(),
        )]);
        Self {
            command_id,
            status_code: err.status_code(),
            body: Some(err.to_body()),
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Header lookup ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
