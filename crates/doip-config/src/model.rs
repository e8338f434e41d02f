//! Resolved, validated configuration model
//!
//! Everything here is immutable after [`load_gateway_config`]
//! (crate::load_gateway_config) returns; the server shares it freely across
//! tasks without locking.

use regex::Regex;

use crate::template::ResponseTemplate;

/// The fully resolved gateway: identity, network binding, and ECUs in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub name: String,
    pub description: Option<String>,
    pub network: NetworkConfig,
    pub protocol_version: u8,
    pub vehicle: VehicleIdentity,
    pub entity_status: EntityStatusConfig,
    pub power_mode: PowerModeConfig,
    pub announcement: AnnouncementConfig,
    pub ecus: Vec<Ecu>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    /// Session idle timeout and shutdown drain budget, in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub vin: [u8; 17],
    pub eid: [u8; 6],
    pub gid: [u8; 6],
    pub logical_address: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityStatusConfig {
    pub node_type: u8,
    pub max_data_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerModeConfig {
    /// Status bytes returned across successive power mode requests.
    /// Always non-empty.
    pub cycle_through: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementConfig {
    pub enabled: bool,
    pub broadcast: String,
}

/// One virtual ECU with its resolved service catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Ecu {
    pub name: String,
    pub description: Option<String>,
    pub target_address: u16,
    pub functional_address: Option<u16>,
    pub tester_addresses: Vec<u16>,
    /// Catalog in declaration order (common services first, then specific).
    pub services: Vec<ServiceEntry>,
}

impl Ecu {
    pub fn allows_tester(&self, source_address: u16) -> bool {
        self.tester_addresses.contains(&source_address)
    }
}

/// A scripted UDS service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub name: String,
    pub matcher: RequestMatcher,
    /// Non-empty unless `no_response` is set.
    pub responses: Vec<ResponseSpec>,
    pub supports_functional: bool,
    /// Suppress the UDS response body; the transport ACK is still sent.
    pub no_response: bool,
    /// Service-level default delay, overridden per response.
    pub delay_ms: Option<u64>,
}

impl ServiceEntry {
    /// Effective delay for the response at `index`.
    pub fn effective_delay_ms(&self, index: usize) -> u64 {
        self.responses
            .get(index)
            .and_then(|r| r.delay_ms)
            .or(self.delay_ms)
            .unwrap_or(0)
    }
}

/// One entry of a service's response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    pub template: ResponseTemplate,
    pub delay_ms: Option<u64>,
}

/// How a service recognises its request.
#[derive(Debug, Clone)]
pub enum RequestMatcher {
    /// Normalised uppercase hex, no `0x` prefix.
    Exact(String),
    /// Case-insensitive pattern tested against the hex string form.
    Pattern(Regex),
}

impl RequestMatcher {
    /// Exact comparison against the request's bare uppercase hex form.
    /// Patterns never match in this pass.
    pub fn matches_exact(&self, request_hex: &str) -> bool {
        match self {
            RequestMatcher::Exact(stored) => stored == request_hex,
            RequestMatcher::Pattern(_) => false,
        }
    }

    /// Regex test against both the bare and the `0x`-prefixed form.
    /// Exact entries never match in this pass.
    pub fn matches_pattern(&self, request_hex: &str) -> bool {
        match self {
            RequestMatcher::Exact(_) => false,
            RequestMatcher::Pattern(re) => {
                re.is_match(request_hex) || re.is_match(&format!("0x{}", request_hex))
            }
        }
    }

    /// The stored pattern text, used for duplicate detection and logging.
    pub fn pattern_text(&self) -> &str {
        match self {
            RequestMatcher::Exact(s) => s,
            RequestMatcher::Pattern(re) => re.as_str(),
        }
    }
}

impl PartialEq for RequestMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RequestMatcher::Exact(a), RequestMatcher::Exact(b)) => a == b,
            (RequestMatcher::Pattern(a), RequestMatcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl GatewayConfig {
    /// The ECU owning `target_address`, if any.
    pub fn ecu_by_target(&self, target_address: u16) -> Option<&Ecu> {
        self.ecus
            .iter()
            .find(|e| e.target_address == target_address)
    }

    /// All ECUs sharing `functional_address`, in declaration order.
    pub fn functional_group(&self, functional_address: u16) -> Vec<&Ecu> {
        self.ecus
            .iter()
            .filter(|e| e.functional_address == Some(functional_address))
            .collect()
    }

    /// Whether any ECU accepts this tester source address. Used for the
    /// routing activation gate.
    pub fn is_tester_known(&self, source_address: u16) -> bool {
        self.ecus.iter().any(|e| e.allows_tester(source_address))
    }

    /// Total number of resolved service entries, for the load summary.
    pub fn service_count(&self) -> usize {
        self.ecus.iter().map(|e| e.services.len()).sum()
    }

    pub fn vin_str(&self) -> &str {
        std::str::from_utf8(&self.vehicle.vin).unwrap_or("<non-ascii>")
    }
}
