// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sensor pollers
//!
//! A poller samples a [`SensorSource`] on an interval and writes the readings
//! into the Thermal resource through
//! [`RedfishService::update_properties`]. Unchanged readings produce no
//! events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::EngineResult;
use crate::service::RedfishService;

/// Poll period used by the simulator
pub const THERMAL_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemperatureReading {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    pub member_id: String,
    pub name: String,
    pub reading_celsius: f64,
    pub upper_threshold_critical: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FanReading {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    pub member_id: String,
    pub name: String,
    pub reading: u64,
    pub reading_units: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalSample {
    pub temperatures: Vec<TemperatureReading>,
    pub fans: Vec<FanReading>,
}

/// Producer of thermal readings, simulated or backed by hardware
pub trait SensorSource: Send + Sync {
    fn sample(&self, at: DateTime<Utc>) -> ThermalSample;
}

/// Random walk around fixed set points
#[derive(Debug)]
pub struct SimulatedThermalSource {
    thermal_uri: String,
    sensors: Vec<(&'static str, f64)>,
    fans: Vec<(&'static str, u64)>,
    rng: Mutex<StdRng>,
}

impl SimulatedThermalSource {
    pub fn new(thermal_uri: impl Into<String>) -> Self {
        Self::with_rng(thermal_uri, StdRng::from_entropy())
    }

    /// Reproducible readings for tests
    pub fn seeded(thermal_uri: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(thermal_uri, StdRng::seed_from_u64(seed))
    }

    fn with_rng(thermal_uri: impl Into<String>, rng: StdRng) -> Self {
        Self {
            thermal_uri: thermal_uri.into(),
            sensors: vec![("CPU1 Temp", 45.0), ("CPU2 Temp", 47.0), ("Inlet Temp", 24.0)],
            fans: vec![("System Fan 1", 6000), ("System Fan 2", 6200)],
            rng: Mutex::new(rng),
        }
    }
}

impl SensorSource for SimulatedThermalSource {
    fn sample(&self, _at: DateTime<Utc>) -> ThermalSample {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let temperatures = self
            .sensors
            .iter()
            .enumerate()
            .map(|(i, (name, base))| {
                let jitter: f64 = rng.gen_range(-2.0..2.0);
                TemperatureReading {
                    odata_id: format!("{}#/Temperatures/{}", self.thermal_uri, i),
                    member_id: i.to_string(),
                    name: name.to_string(),
                    reading_celsius: ((base + jitter) * 10.0).round() / 10.0,
                    upper_threshold_critical: 90.0,
                }
            })
            .collect();

        let fans = self
            .fans
            .iter()
            .enumerate()
            .map(|(i, (name, base))| FanReading {
                odata_id: format!("{}#/Fans/{}", self.thermal_uri, i),
                member_id: i.to_string(),
                name: name.to_string(),
                reading: base + rng.gen_range(0..400),
                reading_units: "RPM".to_string(),
            })
            .collect();

        ThermalSample { temperatures, fans }
    }
}

/// Write one sample into the Thermal resource
pub async fn poll_thermal(
    service: &RedfishService,
    source: &dyn SensorSource,
    thermal_uri: &str,
) -> EngineResult<usize> {
    let sample = source.sample(service.clock().now());
    service
        .update_properties(
            thermal_uri,
            json!({
                "Temperatures": sample.temperatures,
                "Fans": sample.fans,
            }),
        )
        .await
}

/// Poll `source` every `every` until the task is aborted
pub fn spawn_thermal_poller(
    service: Arc<RedfishService>,
    source: Arc<dyn SensorSource>,
    thermal_uri: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match poll_thermal(&service, source.as_ref(), &thermal_uri).await {
                Ok(changed) => debug!(uri = %thermal_uri, changed, "thermal poll"),
                Err(err) => warn!(uri = %thermal_uri, error = %err, "thermal poll failed"),
            }
        }
    })
}
