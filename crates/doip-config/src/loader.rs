//! Document resolution and validation
//!
//! The loader walks gateway → ECU documents → service catalogs, merges
//! catalog files (later files win, with a warning), materialises each ECU's
//! effective catalog in declaration order, and validates the result. It
//! runs once at startup; every failure aborts with a pointer to the
//! offending file and key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::hex;
use crate::model::{
    AnnouncementConfig, Ecu, EntityStatusConfig, GatewayConfig, NetworkConfig, PowerModeConfig,
    RequestMatcher, ResponseSpec, ServiceEntry, VehicleIdentity,
};
use crate::raw::{EcuDoc, GatewayDoc, RawService};
use crate::template::{ResponseTemplate, TemplateError};

/// Load and resolve a gateway configuration from its root document.
pub fn load_gateway_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let doc: GatewayDoc = read_yaml(path)?;
    let base_dir = parent_dir(path);

    validate_network(path, &doc)?;
    let vehicle = resolve_vehicle(path, &doc)?;

    if doc.power_mode.cycle_through.is_empty() {
        return Err(ConfigError::Schema {
            path: path.to_path_buf(),
            message: "power_mode.cycle_through must not be empty".to_string(),
        });
    }

    let mut ecus = Vec::with_capacity(doc.ecus.len());
    for ecu_ref in &doc.ecus {
        let ecu_path = base_dir.join(ecu_ref);
        ecus.push(load_ecu(&ecu_path)?);
    }

    // Target addresses must be unique across the gateway.
    for (i, ecu) in ecus.iter().enumerate() {
        if let Some(other) = ecus[..i]
            .iter()
            .find(|e| e.target_address == ecu.target_address)
        {
            return Err(ConfigError::DuplicateTarget {
                address: ecu.target_address,
                first: other.name.clone(),
                second: ecu.name.clone(),
            });
        }
    }

    let config = GatewayConfig {
        name: doc.gateway.name,
        description: doc.gateway.description,
        network: NetworkConfig {
            host: doc.network.host,
            port: doc.network.port,
            max_connections: doc.network.max_connections,
            timeout_secs: doc.network.timeout,
        },
        protocol_version: doc.protocol.version,
        vehicle,
        entity_status: EntityStatusConfig {
            node_type: doc.entity_status.node_type,
            max_data_size: doc.entity_status.max_data_size,
        },
        power_mode: PowerModeConfig {
            cycle_through: doc.power_mode.cycle_through,
        },
        announcement: AnnouncementConfig {
            enabled: doc.announcement.enabled,
            broadcast: doc.announcement.broadcast,
        },
        ecus,
    };

    debug!(
        gateway = %config.name,
        ecus = config.ecus.len(),
        services = config.service_count(),
        "configuration resolved"
    );
    Ok(config)
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn validate_network(path: &Path, doc: &GatewayDoc) -> Result<(), ConfigError> {
    let schema = |message: String| ConfigError::Schema {
        path: path.to_path_buf(),
        message,
    };

    if doc.network.host.trim().is_empty() {
        return Err(schema("network.host must not be empty".to_string()));
    }
    if doc.network.port == 0 {
        return Err(schema("network.port must be between 1 and 65535".to_string()));
    }
    if doc.network.max_connections == 0 {
        return Err(schema(
            "network.max_connections must be at least 1".to_string(),
        ));
    }
    if doc.network.timeout == 0 {
        return Err(schema("network.timeout must be positive".to_string()));
    }
    if let Some(inverse) = doc.protocol.inverse_version {
        if inverse != !doc.protocol.version {
            return Err(schema(format!(
                "protocol.inverse_version 0x{:02X} is not the complement of version 0x{:02X}",
                inverse, doc.protocol.version
            )));
        }
    }
    Ok(())
}

fn resolve_vehicle(path: &Path, doc: &GatewayDoc) -> Result<VehicleIdentity, ConfigError> {
    let schema = |message: String| ConfigError::Schema {
        path: path.to_path_buf(),
        message,
    };

    let vin_bytes = doc.vehicle.vin.as_bytes();
    if vin_bytes.len() != 17 || !doc.vehicle.vin.is_ascii() {
        return Err(schema(format!(
            "vehicle.vin must be exactly 17 ASCII characters, got {:?}",
            doc.vehicle.vin
        )));
    }
    let mut vin = [0u8; 17];
    vin.copy_from_slice(vin_bytes);

    let eid = fixed_hex::<6>(&doc.vehicle.eid)
        .ok_or_else(|| schema(format!("vehicle.eid must be 6 bytes of hex, got '{}'", doc.vehicle.eid)))?;
    let gid = fixed_hex::<6>(&doc.vehicle.gid)
        .ok_or_else(|| schema(format!("vehicle.gid must be 6 bytes of hex, got '{}'", doc.vehicle.gid)))?;

    Ok(VehicleIdentity {
        vin,
        eid,
        gid,
        logical_address: doc.vehicle.logical_address,
    })
}

fn fixed_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    let bytes = hex::parse_bytes(s)?;
    bytes.try_into().ok()
}

fn load_ecu(path: &Path) -> Result<Ecu, ConfigError> {
    let doc: EcuDoc = read_yaml(path)?;
    let section = doc.ecu;
    let base_dir = parent_dir(path);

    if section.tester_addresses.is_empty() {
        return Err(ConfigError::Schema {
            path: path.to_path_buf(),
            message: format!("ECU '{}': tester_addresses must not be empty", section.name),
        });
    }

    // Merge all referenced catalog files, later files overriding earlier
    // keys section by section.
    let mut common: HashMap<String, (PathBuf, RawService)> = HashMap::new();
    let mut specific: HashMap<String, (PathBuf, RawService)> = HashMap::new();
    for catalog_ref in &section.uds_services.catalog_files {
        let catalog_path = base_dir.join(catalog_ref);
        merge_catalog_file(&catalog_path, "common_services", &mut common)?;
        merge_catalog_file(&catalog_path, "specific_services", &mut specific)?;
    }

    let mut services = Vec::new();
    for name in &section.uds_services.common_services {
        let (origin, raw) = common.get(name).ok_or_else(|| ConfigError::Reference {
            path: path.to_path_buf(),
            ecu: section.name.clone(),
            service: name.clone(),
            section: "common_services",
        })?;
        services.push(resolve_service(origin, name, raw)?);
    }
    for name in &section.uds_services.specific_services {
        let (origin, raw) = specific.get(name).ok_or_else(|| ConfigError::Reference {
            path: path.to_path_buf(),
            ecu: section.name.clone(),
            service: name.clone(),
            section: "specific_services",
        })?;
        services.push(resolve_service(origin, name, raw)?);
    }

    // Two services must not shadow each other on the same traffic.
    for (i, svc) in services.iter().enumerate() {
        if let Some(other) = services[..i].iter().find(|s| {
            s.matcher.pattern_text() == svc.matcher.pattern_text()
                && s.supports_functional == svc.supports_functional
        }) {
            return Err(ConfigError::DuplicateService {
                ecu: section.name.clone(),
                first: other.name.clone(),
                second: svc.name.clone(),
                pattern: svc.matcher.pattern_text().to_string(),
            });
        }
    }

    Ok(Ecu {
        name: section.name,
        description: section.description,
        target_address: section.target_address,
        functional_address: section.functional_address,
        tester_addresses: section.tester_addresses,
        services,
    })
}

/// Read one named section of a catalog file into `merged`, overriding
/// existing keys with a warning. Sections are plain YAML mappings; entry
/// order inside a file does not matter because the ECU's service lists
/// define catalog order.
fn merge_catalog_file(
    path: &Path,
    section: &str,
    merged: &mut HashMap<String, (PathBuf, RawService)>,
) -> Result<(), ConfigError> {
    let value: serde_yaml::Value = read_yaml(path)?;

    let Some(mapping) = value.get(section) else {
        return Ok(());
    };
    let mapping = mapping
        .as_mapping()
        .ok_or_else(|| ConfigError::Schema {
            path: path.to_path_buf(),
            message: format!("'{}' must be a mapping of service definitions", section),
        })?;

    for (key, entry) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| ConfigError::Schema {
                path: path.to_path_buf(),
                message: format!("'{}' contains a non-string service name", section),
            })?
            .to_string();
        let raw: RawService =
            serde_yaml::from_value(entry.clone()).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some((previous, _)) = merged.insert(name.clone(), (path.to_path_buf(), raw)) {
            warn!(
                service = %name,
                section,
                overridden = %previous.display(),
                by = %path.display(),
                "service definition overridden by later catalog file"
            );
        }
    }
    Ok(())
}

fn resolve_service(
    path: &Path,
    name: &str,
    raw: &RawService,
) -> Result<ServiceEntry, ConfigError> {
    let matcher = if let Some(pattern) = raw.request.trim().strip_prefix("regex:") {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::BadRegex {
                path: path.to_path_buf(),
                service: name.to_string(),
                pattern: pattern.to_string(),
                source,
            })?;
        RequestMatcher::Pattern(re)
    } else {
        let normalized = hex::normalize(&raw.request);
        let valid = !normalized.is_empty()
            && normalized.len() % 2 == 0
            && normalized.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ConfigError::BadHex {
                path: path.to_path_buf(),
                service: name.to_string(),
                value: raw.request.clone(),
            });
        }
        RequestMatcher::Exact(normalized)
    };

    let mut responses = Vec::with_capacity(raw.responses.len());
    for raw_response in &raw.responses {
        let template_str = raw_response.template_str();
        let template =
            ResponseTemplate::parse(template_str).map_err(|e| match e {
                TemplateError::InvalidHex(_) | TemplateError::InvalidExpression(_) => {
                    ConfigError::BadHex {
                        path: path.to_path_buf(),
                        service: name.to_string(),
                        value: template_str.to_string(),
                    }
                }
            })?;
        // Static responses must already be decodable; mirrored ones are
        // checked at render time.
        if template.is_static() && hex::parse_bytes(&template.render("")).is_none() {
            return Err(ConfigError::BadHex {
                path: path.to_path_buf(),
                service: name.to_string(),
                value: template_str.to_string(),
            });
        }
        responses.push(ResponseSpec {
            template,
            delay_ms: raw_response.delay_ms(),
        });
    }

    if raw.no_response && !responses.is_empty() {
        warn!(
            service = name,
            file = %path.display(),
            "service declares no_response; configured responses are ignored"
        );
        responses.clear();
    }
    if !raw.no_response && responses.is_empty() {
        return Err(ConfigError::Schema {
            path: path.to_path_buf(),
            message: format!(
                "service '{}' must declare at least one response or set no_response",
                name
            ),
        });
    }

    Ok(ServiceEntry {
        name: name.to_string(),
        matcher,
        responses,
        supports_functional: raw.supports_functional,
        no_response: raw.no_response,
        delay_ms: raw.delay_ms,
    })
}
