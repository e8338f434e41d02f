//! Target address resolution and tester ACL
//!
//! A diagnostic message's target address resolves either to exactly one ECU
//! (physical addressing) or to every ECU sharing that functional group
//! address, in ECU declaration order. The per-ECU tester ACL then partitions
//! the result into the subset that will actually answer this source.

use doip_config::{Ecu, GatewayConfig};

use crate::matcher::AddressMode;

/// Resolve `target_address` to the ECUs it addresses.
///
/// An empty result means the gateway knows nothing about this address; the
/// session engine answers that with a Diagnostic NACK.
pub fn resolve_targets(config: &GatewayConfig, target_address: u16) -> Vec<(&Ecu, AddressMode)> {
    if let Some(ecu) = config.ecu_by_target(target_address) {
        return vec![(ecu, AddressMode::Physical)];
    }
    config
        .functional_group(target_address)
        .into_iter()
        .map(|ecu| (ecu, AddressMode::Functional))
        .collect()
}

/// Keep only the ECUs whose tester ACL admits `source_address`.
///
/// For functional fanout the denied ECUs are silently skipped; the caller
/// decides what an entirely empty result means (UDS `SecurityAccessDenied`).
pub fn partition_by_acl<'a>(
    targets: Vec<(&'a Ecu, AddressMode)>,
    source_address: u16,
) -> Vec<(&'a Ecu, AddressMode)> {
    targets
        .into_iter()
        .filter(|(ecu, _)| ecu.allows_tester(source_address))
        .collect()
}
