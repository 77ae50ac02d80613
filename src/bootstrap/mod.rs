// Copyright (c) 2025 - Cowboy AI, Inc.
//! Simulated OCP Profile
//!
//! Builds the resource tree of a simulated OpenBMC-style manager by issuing
//! ordinary creation commands against a [`RedfishService`]:
//!
//! ```text
//! /redfish/v1
//! ├── SessionService
//! │   └── Sessions            (collection, login via POST)
//! ├── Chassis                 (collection)
//! │   └── 1
//! │       └── Thermal         (sensor poller target)
//! ├── Systems                 (collection)
//! │   └── 1
//! └── Managers                (collection)
//!     └── OBMC
//!         └── NetworkProtocol
//! ```
//!
//! The system and the manager each carry a simulated `Reset` action.
//!
//! Resources are created with built-in defaults. The configurable keys
//! (`chassis.1.*`, `systems.1.*`, `managers.OBMC.*`, `session.timeout`) are
//! registered as [`ConfigBinding`]s, and [`Settings`] are then applied
//! through them. Startup values and reloads pass the same setters a client
//! PATCH would, so an out-of-range value is logged and the default stays.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::CreateResourceCommand;
use crate::config::{ConfigBinding, SessionConfig, Settings};
use crate::errors::EngineResult;
use crate::meta::validators::{bounded_string, integer_range, one_of};
use crate::meta::{MetaDescriptor, MetaTable};
use crate::privilege::{
    PrivilegeMap, Verb, CONFIGURE_COMPONENTS, CONFIGURE_MANAGER, LOGIN,
};
use crate::service::RedfishService;
use crate::session::{SESSIONS_URI, SESSION_SERVICE_URI, SESSION_TIMEOUT_PROPERTY};

pub mod actions;
pub mod sensors;

pub use actions::{ManagerReset, SystemReset, MANAGER_RESET_TYPES, SYSTEM_RESET_TYPES};
pub use sensors::{
    poll_thermal, spawn_thermal_poller, SensorSource, SimulatedThermalSource, ThermalSample,
    THERMAL_POLL_INTERVAL,
};

pub const SERVICE_ROOT_URI: &str = "/redfish/v1";
pub const CHASSIS_COLLECTION_URI: &str = "/redfish/v1/Chassis";
pub const CHASSIS_URI: &str = "/redfish/v1/Chassis/1";
pub const THERMAL_URI: &str = "/redfish/v1/Chassis/1/Thermal";
pub const SYSTEMS_COLLECTION_URI: &str = "/redfish/v1/Systems";
pub const SYSTEM_URI: &str = "/redfish/v1/Systems/1";
pub const MANAGERS_COLLECTION_URI: &str = "/redfish/v1/Managers";
pub const MANAGER_URI: &str = "/redfish/v1/Managers/OBMC";
pub const NETWORK_PROTOCOL_URI: &str = "/redfish/v1/Managers/OBMC/NetworkProtocol";
pub const SYSTEM_RESET_URI: &str = "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset";
pub const MANAGER_RESET_URI: &str = "/redfish/v1/Managers/OBMC/Actions/Manager.Reset";

const METADATA: &str = "/redfish/v1/$metadata";

/// Settings key suffix → property, per bound resource
const MANAGER_KEYS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("description", "Description"),
    ("model", "Model"),
    ("timezone", "DateTimeLocalOffset"),
    ("version", "FirmwareVersion"),
];

const CHASSIS_KEYS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("chassis_type", "ChassisType"),
    ("model", "Model"),
    ("serial_number", "SerialNumber"),
    ("sku", "SKU"),
    ("part_number", "PartNumber"),
    ("asset_tag", "AssetTag"),
    ("manufacturer", "Manufacturer"),
];

const SYSTEM_KEYS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("system_type", "SystemType"),
    ("asset_tag", "AssetTag"),
    ("manufacturer", "Manufacturer"),
    ("model", "Model"),
    ("serial_number", "SerialNumber"),
    ("sku", "SKU"),
    ("part_number", "PartNumber"),
    ("description", "Description"),
    ("power_state", "PowerState"),
    ("bios_version", "BiosVersion"),
    ("led", "IndicatorLED"),
    ("system_hostname", "HostName"),
];

const LED_STATES: &[&str] = &["On", "Off", "Lit", "Blinking"];

/// Install the profile, register its config bindings, then apply `settings`
///
/// `settings` overlay the engine's configured session timeout. Rejected
/// values are logged and leave the default in place.
pub async fn install(service: &RedfishService, settings: &Settings) -> EngineResult<()> {
    install_service_root(service).await?;
    install_session_service(service).await?;
    install_chassis(service).await?;
    install_system(service).await?;
    install_manager(service, settings).await?;

    service
        .register_action(SYSTEM_RESET_URI, SYSTEM_URI, Arc::new(SystemReset))
        .await;
    service
        .register_action(MANAGER_RESET_URI, MANAGER_URI, Arc::new(ManagerReset))
        .await;

    bind(service, "session.timeout", SESSION_SERVICE_URI, SESSION_TIMEOUT_PROPERTY).await;
    for (prefix, uri, keys) in [
        ("managers.OBMC", MANAGER_URI, MANAGER_KEYS),
        ("chassis.1", CHASSIS_URI, CHASSIS_KEYS),
        ("systems.1", SYSTEM_URI, SYSTEM_KEYS),
    ] {
        for (key, property) in keys {
            bind(service, &format!("{}.{}", prefix, key), uri, property).await;
        }
    }

    let mut effective = Settings::new().with("session.timeout", service.config().session.timeout);
    effective.merge(settings.clone());
    let rejected = service.apply_settings(&effective).await;
    if !rejected.is_empty() {
        warn!(rejected = rejected.len(), "profile installed with default values for rejected settings");
    }

    info!(resources = service.store().uris().await.len(), "OCP profile installed");
    Ok(())
}

async fn bind(service: &RedfishService, key: &str, uri: &str, property: &str) {
    service
        .add_binding(ConfigBinding::new(key, uri, property))
        .await;
}

fn odata_ref(uri: &str) -> Value {
    json!({ "@odata.id": uri })
}

/// `Actions` property advertising one reset action
fn reset_action(name: &str, target: &str, reset_types: &[&str]) -> Value {
    json!({
        name: {
            "target": target,
            "ResetType@Redfish.AllowableValues": reset_types,
        }
    })
}

fn read_only() -> PrivilegeMap {
    PrivilegeMap::new().allow(Verb::Get, [LOGIN])
}

/// Setter for properties clients may not write but configuration may
fn configured() -> MetaDescriptor {
    MetaDescriptor::new()
        .with_setter(bounded_string(255))
        .with_privileges(PrivilegeMap::new().allow(Verb::Patch, [CONFIGURE_MANAGER]))
}

/// Initial values of bound properties; keys without a default start null
fn bound_defaults(defaults: &[(&str, Value)], keys: &[(&str, &str)]) -> Map<String, Value> {
    keys.iter()
        .map(|(key, property)| {
            let value = defaults
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null);
            (property.to_string(), value)
        })
        .collect()
}

fn resource(
    service: &RedfishService,
    uri: &str,
    resource_type: &str,
    context: &str,
) -> CreateResourceCommand {
    CreateResourceCommand::new(
        uri,
        resource_type,
        format!("{}#{}", METADATA, context),
        service.clock().now(),
        Uuid::now_v7(),
    )
}

fn collection(
    service: &RedfishService,
    uri: &str,
    type_name: &str,
    name: &str,
) -> CreateResourceCommand {
    resource(
        service,
        uri,
        &format!("#{}.{}", type_name, type_name),
        &format!("{}.{}", type_name, type_name),
    )
    .as_collection()
    .with_properties(json!({ "Name": name }))
    .with_privileges(read_only())
}

async fn install_service_root(service: &RedfishService) -> EngineResult<()> {
    let command = resource(
        service,
        SERVICE_ROOT_URI,
        "#ServiceRoot.v1_0_2.ServiceRoot",
        "ServiceRoot.ServiceRoot",
    )
    .with_properties(json!({
        "Id": "RootService",
        "Name": "Root Service",
        "RedfishVersion": "1.0.2",
        "UUID": Uuid::now_v7().to_string(),
        "SessionService": odata_ref(SESSION_SERVICE_URI),
        "Chassis": odata_ref(CHASSIS_COLLECTION_URI),
        "Systems": odata_ref(SYSTEMS_COLLECTION_URI),
        "Managers": odata_ref(MANAGERS_COLLECTION_URI),
        "Links": { "Sessions": odata_ref(SESSIONS_URI) },
    }))
    .with_privileges(PrivilegeMap::new().public(Verb::Get));

    service.create_resource(command).await?;
    Ok(())
}

async fn install_session_service(service: &RedfishService) -> EngineResult<()> {
    let command = resource(
        service,
        SESSION_SERVICE_URI,
        "#SessionService.v1_0_2.SessionService",
        "SessionService.SessionService",
    )
    .with_properties(json!({
        "Id": "SessionService",
        "Name": "Session Service",
        "Description": "Session Service",
        "ServiceEnabled": true,
        SESSION_TIMEOUT_PROPERTY: SessionConfig::default().timeout,
        "Sessions": odata_ref(SESSIONS_URI),
    }))
    .with_privileges(
        PrivilegeMap::new()
            .allow(Verb::Get, [LOGIN])
            .allow(Verb::Patch, [CONFIGURE_MANAGER]),
    )
    .with_meta(MetaTable::new().with(
        SESSION_TIMEOUT_PROPERTY,
        MetaDescriptor::new().with_setter(integer_range(30, 86_400)),
    ));
    service.create_resource(command).await?;

    let sessions = collection(service, SESSIONS_URI, "SessionCollection", "Session Collection")
        .with_privileges(
            PrivilegeMap::new()
                .allow(Verb::Get, [CONFIGURE_MANAGER])
                .public(Verb::Post),
        );
    service.create_resource(sessions).await?;
    Ok(())
}

async fn install_chassis(service: &RedfishService) -> EngineResult<()> {
    service
        .create_resource(collection(
            service,
            CHASSIS_COLLECTION_URI,
            "ChassisCollection",
            "Chassis Collection",
        ))
        .await?;

    let defaults = [
        ("name", json!("Catfish System Chassis")),
        ("chassis_type", json!("RackMount")),
        ("model", json!("YellowCat1000")),
        ("serial_number", json!("2M220100SL")),
        ("sku", json!("The SKU")),
        ("part_number", json!("Part2468")),
        ("asset_tag", json!("CATFISHASSETTAG")),
        ("manufacturer", json!("Cat manufacturer")),
    ];
    let mut properties = bound_defaults(&defaults, CHASSIS_KEYS);
    properties.insert("Id".to_string(), json!("1"));
    properties.insert("IndicatorLED".to_string(), json!("Lit"));
    properties.insert("PowerState".to_string(), json!("On"));
    properties.insert("Status".to_string(), json!({ "State": "Enabled", "Health": "OK" }));
    properties.insert("Thermal".to_string(), odata_ref(THERMAL_URI));
    properties.insert(
        "Links".to_string(),
        json!({
            "ComputerSystems": [odata_ref(SYSTEM_URI)],
            "ManagedBy": [odata_ref(MANAGER_URI)],
        }),
    );

    let meta = bound_meta(CHASSIS_KEYS, &["AssetTag"])
        .with("AssetTag", MetaDescriptor::new().with_setter(bounded_string(64)))
        .with("IndicatorLED", MetaDescriptor::new().with_setter(one_of(LED_STATES)));

    let chassis = resource(service, CHASSIS_URI, "#Chassis.v1_2_0.Chassis", "Chassis.Chassis")
        .with_properties(Value::Object(properties))
        .with_privileges(read_only().allow(Verb::Patch, [CONFIGURE_COMPONENTS]))
        .with_meta(meta);
    service.link_member(CHASSIS_COLLECTION_URI, chassis).await?;

    let thermal = resource(service, THERMAL_URI, "#Thermal.v1_1_0.Thermal", "Thermal.Thermal")
        .with_properties(json!({
            "Id": "Thermal",
            "Name": "Thermal",
            "Temperatures": [],
            "Fans": [],
        }))
        .with_privileges(read_only());
    service.create_resource(thermal).await?;
    Ok(())
}

async fn install_system(service: &RedfishService) -> EngineResult<()> {
    service
        .create_resource(collection(
            service,
            SYSTEMS_COLLECTION_URI,
            "ComputerSystemCollection",
            "Computer System Collection",
        ))
        .await?;

    let defaults = [
        ("name", json!("Catfish System")),
        ("system_type", json!("Physical")),
        ("asset_tag", json!("CATFISHASSETTAG")),
        ("manufacturer", json!("Cat manufacturer")),
        ("model", json!("YellowCat1000")),
        ("serial_number", json!("2M220100SL")),
        ("sku", json!("The SKU")),
        ("part_number", json!("Part2468")),
        (
            "description",
            json!("Catfish Implementation Recipe of simple scale-out monolithic server"),
        ),
        ("power_state", json!("On")),
        ("bios_version", json!("X00.1.2.3.4(build-23)")),
        ("led", json!("On")),
        ("system_hostname", json!("catfish")),
    ];
    let mut properties = bound_defaults(&defaults, SYSTEM_KEYS);
    properties.insert("Id".to_string(), json!("1"));
    properties.insert("Status".to_string(), json!({ "State": "Enabled", "Health": "OK" }));
    properties.insert(
        "Actions".to_string(),
        reset_action("#ComputerSystem.Reset", SYSTEM_RESET_URI, SYSTEM_RESET_TYPES),
    );
    properties.insert(
        "Links".to_string(),
        json!({
            "Chassis": [odata_ref(CHASSIS_URI)],
            "ManagedBy": [odata_ref(MANAGER_URI)],
        }),
    );

    let meta = bound_meta(SYSTEM_KEYS, &["AssetTag", "PowerState", "IndicatorLED", "HostName"])
        .with("AssetTag", MetaDescriptor::new().with_setter(bounded_string(64)))
        .with("PowerState", MetaDescriptor::new().with_setter(one_of(&["On", "Off"])))
        .with("IndicatorLED", MetaDescriptor::new().with_setter(one_of(LED_STATES)))
        .with("HostName", MetaDescriptor::new().with_setter(bounded_string(255)));

    let system = resource(
        service,
        SYSTEM_URI,
        "#ComputerSystem.v1_1_0.ComputerSystem",
        "ComputerSystem.ComputerSystem",
    )
    .with_properties(Value::Object(properties))
    .with_privileges(
        read_only()
            .allow(Verb::Patch, [CONFIGURE_COMPONENTS])
            .allow(Verb::Post, [CONFIGURE_COMPONENTS]),
    )
    .with_meta(meta);
    service.link_member(SYSTEMS_COLLECTION_URI, system).await?;
    Ok(())
}

async fn install_manager(service: &RedfishService, settings: &Settings) -> EngineResult<()> {
    service
        .create_resource(collection(
            service,
            MANAGERS_COLLECTION_URI,
            "ManagerCollection",
            "Manager Collection",
        ))
        .await?;

    let defaults = [
        ("name", json!("OBMC Simulation")),
        ("description", json!("The most open source BMC ever.")),
        ("model", json!("Michaels RAD BMC")),
        ("timezone", json!("-05:00")),
        ("version", json!("1.0.0")),
    ];
    let mut properties = bound_defaults(&defaults, MANAGER_KEYS);
    properties.insert("Id".to_string(), json!("OBMC"));
    properties.insert("ManagerType".to_string(), json!("BMC"));
    properties.insert("DateTime".to_string(), Value::Null);
    properties.insert("Status".to_string(), json!({ "State": "Enabled", "Health": "OK" }));
    properties.insert("NetworkProtocol".to_string(), odata_ref(NETWORK_PROTOCOL_URI));
    properties.insert(
        "Actions".to_string(),
        reset_action("#Manager.Reset", MANAGER_RESET_URI, MANAGER_RESET_TYPES),
    );
    properties.insert(
        "Links".to_string(),
        json!({
            "ManagerForChassis": [odata_ref(CHASSIS_URI)],
            "ManagerForServers": [odata_ref(SYSTEM_URI)],
            "ManagerInChassis": odata_ref(CHASSIS_URI),
        }),
    );

    let clock = Arc::clone(service.clock());
    let meta = bound_meta(MANAGER_KEYS, &["DateTimeLocalOffset"])
        .with(
            "DateTimeLocalOffset",
            MetaDescriptor::new().with_setter(bounded_string(6)),
        )
        .with(
            "DateTime",
            MetaDescriptor::new().with_getter(move |_| json!(clock.now().to_rfc3339())),
        );

    let manager = resource(service, MANAGER_URI, "#Manager.v1_1_0.Manager", "Manager.Manager")
        .with_properties(Value::Object(properties))
        .with_privileges(
            read_only()
                .allow(Verb::Patch, [CONFIGURE_MANAGER])
                .allow(Verb::Post, [CONFIGURE_MANAGER]),
        )
        .with_meta(meta);
    service.link_member(MANAGERS_COLLECTION_URI, manager).await?;

    let mut protocol = Map::new();
    protocol.insert("Id".to_string(), json!("NetworkProtocol"));
    protocol.insert("Name".to_string(), json!("Manager Network Protocol"));
    protocol.insert("HostName".to_string(), json!("OBMC"));
    for (name, enabled, port) in protocols(settings) {
        protocol.insert(name, json!({ "ProtocolEnabled": enabled, "Port": port }));
    }

    let network = resource(
        service,
        NETWORK_PROTOCOL_URI,
        "#ManagerNetworkProtocol.v1_0_2.ManagerNetworkProtocol",
        "ManagerNetworkProtocol.ManagerNetworkProtocol",
    )
    .with_properties(Value::Object(protocol))
    .with_privileges(read_only().allow(Verb::Patch, [CONFIGURE_MANAGER]));
    service.create_resource(network).await?;
    Ok(())
}

/// Descriptors for bound properties that have no client-facing setter
fn bound_meta(keys: &[(&str, &str)], client_writable: &[&str]) -> MetaTable {
    keys.iter()
        .filter(|(_, property)| !client_writable.contains(property))
        .fold(MetaTable::new(), |meta, (_, property)| {
            meta.with(*property, configured())
        })
}

/// `managers.OBMC.proto` entries over the default protocol table
///
/// Entries missing a name, an enabled flag or a port are skipped.
fn protocols(settings: &Settings) -> Vec<(String, bool, u64)> {
    let mut table: Vec<(String, bool, u64)> = [
        ("HTTPS", true, 443),
        ("HTTP", false, 80),
        ("IPMI", false, 623),
        ("SSH", false, 22),
        ("SNMP", false, 161),
        ("Telnet", false, 23),
        ("SSDP", false, 1900),
    ]
    .into_iter()
    .map(|(name, enabled, port)| (name.to_string(), enabled, port))
    .collect();

    let overrides = settings
        .get("managers.OBMC.proto")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for entry in overrides {
        let name = entry.get("name").and_then(Value::as_str);
        let enabled = entry.get("enabled").and_then(Value::as_bool);
        let port = entry.get("port").and_then(Value::as_u64);
        let (Some(name), Some(enabled), Some(port)) = (name, enabled, port) else {
            tracing::debug!(%entry, "skipping malformed protocol entry");
            continue;
        };
        match table.iter_mut().find(|(n, _, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => *slot = (slot.0.clone(), enabled, port),
            None => table.push((name.to_string(), enabled, port)),
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bound_defaults_fill_every_key() {
        let properties = bound_defaults(
            &[("model", json!("YellowCat1000"))],
            &[("model", "Model"), ("sku", "SKU")],
        );

        assert_eq!(properties["Model"], json!("YellowCat1000"));
        assert_eq!(properties["SKU"], Value::Null);
    }

    #[test]
    fn test_protocol_overrides() {
        let settings = Settings::new().with(
            "managers.OBMC.proto",
            json!([
                { "name": "ssh", "enabled": true, "port": 2222 },
                { "name": "broken" },
            ]),
        );
        let table = protocols(&settings);

        assert!(table.contains(&("SSH".to_string(), true, 2222)));
        assert!(!table.iter().any(|(n, _, _)| n == "broken"));
    }

    #[test]
    fn test_bound_meta_skips_client_writable() {
        let meta = bound_meta(CHASSIS_KEYS, &["AssetTag"]);
        assert!(meta.get("Model").is_some());
        assert!(meta.get("AssetTag").is_none());
    }
}
