//! Service selection and response production
//!
//! Given an ECU's catalog and the hex form of a UDS request, pick the
//! matching service entry (exact patterns first, regex second, both in
//! catalog declaration order) and produce the next response in its cycle.

use doip_config::{hex, Ecu, ServiceEntry};
use tracing::{debug, warn};

use crate::cycle::CycleTable;
use crate::uds::{self, nrc};

/// Whether the request reached the ECU by its own address or a shared
/// functional group address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Physical,
    Functional,
}

/// What the ECU sends back for one matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceReply {
    /// Emit a diagnostic message after sleeping `delay_ms`.
    Body {
        service: String,
        response_index: usize,
        delay_ms: u64,
        bytes: Vec<u8>,
    },
    /// `no_response` service: the transport ACK is the only reply.
    Silent { service: String },
}

/// Select the service entry matching `request_hex` (bare uppercase hex).
///
/// Exact entries are tried over the whole catalog before any regex entry;
/// within a pass, declaration order decides. Entries that do not support
/// functional addressing are invisible to functional requests.
pub fn select_service<'a>(
    ecu: &'a Ecu,
    request_hex: &str,
    mode: AddressMode,
) -> Option<&'a ServiceEntry> {
    let visible = |svc: &&ServiceEntry| -> bool {
        mode == AddressMode::Physical || svc.supports_functional
    };

    ecu.services
        .iter()
        .filter(visible)
        .find(|svc| svc.matcher.matches_exact(request_hex))
        .or_else(|| {
            ecu.services
                .iter()
                .filter(visible)
                .find(|svc| svc.matcher.matches_pattern(request_hex))
        })
}

/// Produce the reply for a matched service: advance the shared cycle,
/// render the response template against the request, and compute the
/// effective delay.
///
/// A template that renders into something that is not byte-aligned hex
/// degrades to a `GeneralProgrammingFailure` negative response.
pub fn execute_service(
    ecu: &Ecu,
    service: &ServiceEntry,
    request_hex: &str,
    uds_request: &[u8],
    cycles: &CycleTable,
) -> ServiceReply {
    if service.no_response {
        debug!(
            ecu = %ecu.name,
            service = %service.name,
            "service is scripted with no response"
        );
        return ServiceReply::Silent {
            service: service.name.clone(),
        };
    }

    let index = cycles.advance(ecu.target_address, &service.name, service.responses.len());
    let rendered = service.responses[index].template.render(request_hex);

    let bytes = match hex::parse_bytes(&rendered) {
        Some(bytes) => bytes,
        None => {
            warn!(
                ecu = %ecu.name,
                service = %service.name,
                rendered = %rendered,
                "mirrored response did not render to valid hex"
            );
            uds::negative_response(uds::request_sid(uds_request), nrc::GENERAL_PROGRAMMING_FAILURE)
        }
    };

    ServiceReply::Body {
        service: service.name.clone(),
        response_index: index,
        delay_ms: service.effective_delay_ms(index),
        bytes,
    }
}
