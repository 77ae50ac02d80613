// Copyright (c) 2025 - Cowboy AI, Inc.
//! Simulated reset actions
//!
//! Nothing is power cycled. A system reset moves `PowerState` the way the
//! requested `ResetType` would; a manager reset only acknowledges.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{EngineError, EngineResult};
use crate::service::{allowable_parameter, ActionHandler, ActionRequest, RedfishService};

pub const SYSTEM_RESET_TYPES: &[&str] = &[
    "On",
    "ForceOff",
    "GracefulShutdown",
    "GracefulRestart",
    "ForceRestart",
    "Nmi",
    "ForceOn",
    "PushPowerButton",
];

pub const MANAGER_RESET_TYPES: &[&str] = &["GracefulRestart", "ForceRestart"];

/// `ComputerSystem.Reset`
#[derive(Debug, Default)]
pub struct SystemReset;

/// Power state after `reset_type`, starting from `current`
fn next_power_state(reset_type: &str, current: &str) -> &'static str {
    match reset_type {
        "ForceOff" | "GracefulShutdown" => "Off",
        "PushPowerButton" if current == "On" => "Off",
        _ => "On",
    }
}

#[async_trait]
impl ActionHandler for SystemReset {
    async fn invoke(
        &self,
        service: &RedfishService,
        request: &ActionRequest<'_>,
    ) -> EngineResult<Value> {
        let reset_type = allowable_parameter(request.body, "ResetType", SYSTEM_RESET_TYPES)?;

        let (_, handle) = service
            .store()
            .resolve(request.target)
            .await
            .ok_or_else(|| EngineError::NotFound(request.target.to_string()))?;
        let current = handle
            .read()
            .await
            .state
            .properties
            .get("PowerState")
            .and_then(Value::as_str)
            .unwrap_or("Off")
            .to_string();

        let next = next_power_state(reset_type, &current);
        service
            .update_properties(request.target, json!({ "PowerState": next }))
            .await?;

        info!(system = %request.target, %reset_type, from = %current, to = %next, "simulated system reset");
        Ok(json!({ "RESET": "FAKE SIMULATED COMPUTER RESET" }))
    }
}

/// `Manager.Reset`
#[derive(Debug, Default)]
pub struct ManagerReset;

#[async_trait]
impl ActionHandler for ManagerReset {
    async fn invoke(
        &self,
        _service: &RedfishService,
        request: &ActionRequest<'_>,
    ) -> EngineResult<Value> {
        let reset_type = allowable_parameter(request.body, "ResetType", MANAGER_RESET_TYPES)?;
        info!(manager = %request.target, %reset_type, "simulated manager reset");
        Ok(json!({ "RESET": "FAKE SIMULATED MANAGER RESET" }))
    }
}
