// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-redfish
//!
//! Deterministic ids and timestamps for pure handler tests, plus a fully
//! bootstrapped service driven by a [`ManualClock`] for integration tests.
//!
//! # Design Principles
//! - Pure tests use the fixed constants, never `Uuid::now_v7()` or `Utc::now()`
//! - Service tests advance time only through the shared `ManualClock`
//! - Requests go through `handle_request`, exactly as a front end would

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use cim_redfish::aggregate::CreateResourceCommand;
use cim_redfish::bootstrap;
use cim_redfish::bus::InMemoryEventBus;
use cim_redfish::clock::ManualClock;
use cim_redfish::config::{DumpConfig, EngineConfig, Role, SessionConfig, Settings, UserConfig};
use cim_redfish::privilege::{PrivilegeMap, Verb};
use cim_redfish::service::{CommandResponse, ProtocolRequest, RedfishService};
use cim_redfish::session::{TokenSigner, SESSIONS_URI};

// Fixed test UUIDs (UUID v7 format, but deterministic for testing)
pub const AGGREGATE_ID_1: &str = "01934f4a-1000-7000-8000-000000001000";
pub const AGGREGATE_ID_2: &str = "01934f4a-1001-7000-8000-000000001001";
pub const CORRELATION_ID_1: &str = "01934f4a-c001-7000-8000-00000000c001";
pub const CORRELATION_ID_2: &str = "01934f4a-c002-7000-8000-00000000c002";

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

/// Session idle timeout used by [`TestHarness`]
pub const SESSION_TIMEOUT_SECS: u64 = 30;

pub const ROOT: (&str, &str) = ("root", "calvin");
pub const OPERATOR: (&str, &str) = ("operator", "op-pass");
pub const GUEST: (&str, &str) = ("guest", "guest-pass");

/// Signing secret shared by every [`TestHarness`]
pub const TOKEN_SECRET: &str = "harness-signing-secret";

/// Parse a fixed UUID from a constant string
pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

/// Parse the fixed timestamp
pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

/// Plain resource with one writable property
pub fn create_command(uri: &str) -> CreateResourceCommand {
    CreateResourceCommand::new(
        uri,
        "#Widget.v1_0_0.Widget",
        "/redfish/v1/$metadata#Widget.Widget",
        fixed_timestamp(),
        parse_uuid(CORRELATION_ID_1),
    )
    .with_properties(json!({
        "Id": "1",
        "Name": "Widget",
        "Counter": 0,
        "Label": "plain",
    }))
    .writable(["Counter", "Label"])
    .with_privileges(
        PrivilegeMap::new()
            .allow(Verb::Get, ["Login"])
            .allow(Verb::Patch, ["ConfigureComponents"])
            .allow(Verb::Delete, ["ConfigureComponents"]),
    )
}

fn users() -> Vec<UserConfig> {
    [
        (ROOT, Role::Administrator),
        (OPERATOR, Role::Operator),
        (GUEST, Role::ReadOnly),
    ]
    .into_iter()
    .map(|((username, password), role)| UserConfig {
        username: username.to_string(),
        password: password.to_string(),
        role,
    })
    .collect()
}

pub struct TestHarness {
    pub service: Arc<RedfishService>,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<InMemoryEventBus>,
}

impl TestHarness {
    /// Service with the OCP profile installed from default settings
    pub async fn new() -> Self {
        Self::with_settings(Settings::new()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let clock = Arc::new(ManualClock::new(fixed_timestamp()));
        let bus = Arc::new(InMemoryEventBus::new(4096));
        let config = EngineConfig {
            session: SessionConfig {
                timeout: SESSION_TIMEOUT_SECS,
                ..SessionConfig::default()
            },
            users: users(),
            dump: DumpConfig::from_settings(&settings).expect("valid dump settings"),
            ..EngineConfig::default()
        };

        let service = RedfishService::builder(config)
            .with_clock(clock.clone())
            .with_bus(bus.clone())
            .with_signer(TokenSigner::from_secret(TOKEN_SECRET))
            .build();
        bootstrap::install(&service, &settings)
            .await
            .expect("profile installs");

        Self {
            service: Arc::new(service),
            clock,
            bus,
        }
    }

    pub async fn send(&self, request: ProtocolRequest) -> CommandResponse {
        self.service.handle_request(request).await
    }

    /// Log in and return `(token, session uri)`
    pub async fn login(&self, (username, password): (&str, &str)) -> (String, String) {
        let response = self
            .send(
                ProtocolRequest::new("POST", SESSIONS_URI)
                    .with_body(json!({ "UserName": username, "Password": password })),
            )
            .await;
        assert_eq!(response.status_code, 201, "login failed: {:?}", response.body);
        let token = response.header("X-Auth-Token").expect("token header").to_string();
        let location = response.header("Location").expect("location header").to_string();
        (token, location)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> CommandResponse {
        self.send(authorized(ProtocolRequest::new("GET", uri), token)).await
    }

    pub async fn patch(&self, uri: &str, body: Value, token: Option<&str>) -> CommandResponse {
        self.send(authorized(ProtocolRequest::new("PATCH", uri).with_body(body), token))
            .await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> CommandResponse {
        self.send(authorized(ProtocolRequest::new("POST", uri).with_body(body), token))
            .await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> CommandResponse {
        self.send(authorized(ProtocolRequest::new("DELETE", uri), token)).await
    }

    /// Aggregate version, read straight from the store
    pub async fn version(&self, uri: &str) -> u64 {
        let (_, handle) = self.service.store().resolve(uri).await.expect("resource exists");
        let version = handle.read().await.state.version;
        version
    }

    /// Raw stored property, bypassing getters
    pub async fn raw_property(&self, uri: &str, name: &str) -> Option<Value> {
        let (_, handle) = self.service.store().resolve(uri).await?;
        let value = handle.read().await.state.properties.get(name).cloned();
        value
    }
}

pub fn authorized(request: ProtocolRequest, token: Option<&str>) -> ProtocolRequest {
    match token {
        Some(token) => request.with_header("X-Auth-Token", token),
        None => request,
    }
}

/// Response body, which every non-204 response carries
pub fn body(response: &CommandResponse) -> &Value {
    response.body.as_ref().expect("response body")
}
