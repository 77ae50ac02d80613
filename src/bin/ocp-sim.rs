// Copyright (c) 2025 - Cowboy AI, Inc.
//! OCP Simulator
//!
//! Runs the simulated OCP profile in-process: installs the resource tree,
//! starts the thermal poller and the session reaper, and logs every
//! committed event.
//!
//! Run with: cargo run --bin ocp-sim
//!
//! Environment:
//! - `OCP_CONFIG`: TOML settings file (optional; built-in defaults otherwise)
//! - `RUST_LOG`: overrides the configured log filter
//!
//! Sending SIGHUP re-reads `OCP_CONFIG` and re-applies bound settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cim_redfish::bootstrap::{self, SimulatedThermalSource, THERMAL_POLL_INTERVAL, THERMAL_URI};
use cim_redfish::bus::InMemoryEventBus;
use cim_redfish::config::{EngineConfig, Settings};
use cim_redfish::service::RedfishService;
use cim_redfish::session::spawn_session_reaper;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_toml_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(Settings::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("OCP_CONFIG").map(PathBuf::from);
    let settings = load_settings(config_path.as_ref())?;
    let config = EngineConfig::from_settings(&settings).context("Invalid engine configuration")?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log.filter_directives()))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        config = ?config_path,
        users = config.users.len(),
        session_timeout = config.session.timeout,
        "starting OCP simulator"
    );
    if config.users.is_empty() {
        warn!("no users configured; logins will be rejected");
    }

    let bus = Arc::new(InMemoryEventBus::default());
    let mut events = bus.subscribe();
    let reap_interval = Duration::from_secs(config.session.reap_interval.max(1));

    let service = Arc::new(RedfishService::builder(config).with_bus(bus.clone()).build());
    bootstrap::install(&service, &settings)
        .await
        .context("Failed to install OCP profile")?;

    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    event_type = event.event_type_name(),
                    aggregate_id = %event.aggregate_id(),
                    correlation_id = %event.correlation_id(),
                    "event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let poller = bootstrap::spawn_thermal_poller(
        Arc::clone(&service),
        Arc::new(SimulatedThermalSource::new(THERMAL_URI)),
        THERMAL_URI.to_string(),
        THERMAL_POLL_INTERVAL,
    );
    let reaper = spawn_session_reaper(Arc::clone(service.sessions()), reap_interval);

    wait_for_shutdown(&service, config_path.as_ref()).await?;

    info!("shutting down");
    poller.abort();
    reaper.abort();
    event_logger.abort();
    Ok(())
}

/// Re-apply settings on SIGHUP until Ctrl-C
#[cfg(unix)]
async fn wait_for_shutdown(service: &RedfishService, config_path: Option<&PathBuf>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
            _ = hangup.recv() => reload(service, config_path).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_service: &RedfishService, _config_path: Option<&PathBuf>) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(service: &RedfishService, config_path: Option<&PathBuf>) {
    info!("re-applying configuration");
    let settings = match load_settings(config_path) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "reload failed; keeping current values");
            return;
        }
    };
    let rejected = service.apply_settings(&settings).await;
    debug!(rejected = rejected.len(), "configuration re-applied");
}
