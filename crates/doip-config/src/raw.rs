//! Raw serde shapes of the configuration documents
//!
//! These structs mirror the YAML layout one-to-one. Normalisation and
//! cross-document validation happen in the loader, which turns them into
//! the resolved model.

use serde::Deserialize;

use crate::hex;

/// Root gateway document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayDoc {
    pub gateway: GatewaySection,
    pub network: NetworkSection,
    #[serde(default)]
    pub protocol: ProtocolSection,
    pub vehicle: VehicleSection,
    #[serde(default)]
    pub entity_status: EntityStatusSection,
    #[serde(default)]
    pub power_mode: PowerModeSection,
    #[serde(default)]
    pub announcement: AnnouncementSection,
    /// ECU document paths, relative to this document's directory.
    pub ecus: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GatewaySection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds, also the shutdown drain budget.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_max_connections() -> usize {
    5
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct ProtocolSection {
    #[serde(default = "default_protocol_version", deserialize_with = "hex::u8_from_hex")]
    pub version: u8,
    #[serde(default, deserialize_with = "hex::opt_u8_from_hex")]
    pub inverse_version: Option<u8>,
}

fn default_protocol_version() -> u8 {
    0x02
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            version: default_protocol_version(),
            inverse_version: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VehicleSection {
    /// 17 ASCII characters.
    pub vin: String,
    /// 6 bytes of hex.
    pub eid: String,
    /// 6 bytes of hex.
    pub gid: String,
    #[serde(deserialize_with = "hex::u16_from_hex")]
    pub logical_address: u16,
}

#[derive(Debug, Deserialize)]
pub struct EntityStatusSection {
    #[serde(default, deserialize_with = "hex::u8_from_hex")]
    pub node_type: u8,
    #[serde(default = "default_max_data_size")]
    pub max_data_size: u32,
}

fn default_max_data_size() -> u32 {
    0xFFFF
}

impl Default for EntityStatusSection {
    fn default() -> Self {
        Self {
            node_type: 0x00,
            max_data_size: default_max_data_size(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PowerModeSection {
    /// Status values cycled across successive power mode requests.
    #[serde(
        default = "default_power_mode_cycle",
        deserialize_with = "hex::u8_vec_from_hex"
    )]
    pub cycle_through: Vec<u8>,
}

fn default_power_mode_cycle() -> Vec<u8> {
    vec![0x01]
}

impl Default for PowerModeSection {
    fn default() -> Self {
        Self {
            cycle_through: default_power_mode_cycle(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broadcast")]
    pub broadcast: String,
}

fn default_broadcast() -> String {
    "255.255.255.255".to_string()
}

impl Default for AnnouncementSection {
    fn default() -> Self {
        Self {
            enabled: false,
            broadcast: default_broadcast(),
        }
    }
}

/// Per-ECU document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcuDoc {
    pub ecu: EcuSection,
}

#[derive(Debug, Deserialize)]
pub struct EcuSection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "hex::u16_from_hex")]
    pub target_address: u16,
    #[serde(default, deserialize_with = "hex::opt_u16_from_hex")]
    pub functional_address: Option<u16>,
    /// Allowed tester (source) addresses.
    #[serde(deserialize_with = "hex::u16_vec_from_hex")]
    pub tester_addresses: Vec<u16>,
    pub uds_services: UdsServicesSection,
}

#[derive(Debug, Deserialize)]
pub struct UdsServicesSection {
    /// Service catalog paths, relative to the ECU document's directory.
    pub catalog_files: Vec<String>,
    #[serde(default)]
    pub common_services: Vec<String>,
    #[serde(default)]
    pub specific_services: Vec<String>,
}

/// One service definition inside a catalog section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawService {
    /// Exact hex pattern, or a regex when prefixed with `regex:`.
    pub request: String,
    #[serde(default)]
    pub responses: Vec<RawResponse>,
    #[serde(default)]
    pub supports_functional: bool,
    #[serde(default)]
    pub no_response: bool,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A response is either a bare hex string or a record with its own delay.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawResponse {
    Hex(String),
    Detailed {
        response: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },
}

impl RawResponse {
    pub fn template_str(&self) -> &str {
        match self {
            RawResponse::Hex(s) => s,
            RawResponse::Detailed { response, .. } => response,
        }
    }

    pub fn delay_ms(&self) -> Option<u64> {
        match self {
            RawResponse::Hex(_) => None,
            RawResponse::Detailed { delay_ms, .. } => *delay_ms,
        }
    }
}
