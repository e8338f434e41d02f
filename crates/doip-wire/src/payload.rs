//! Typed DoIP payload bodies

use crate::error::DecodeError;
use crate::header::PayloadType;

/// Generic Header NACK codes (payload type 0x0000).
pub mod nack_code {
    pub const INCORRECT_PATTERN_FORMAT: u8 = 0x00;
    pub const UNKNOWN_PAYLOAD_TYPE: u8 = 0x01;
    pub const MESSAGE_TOO_LARGE: u8 = 0x02;
    pub const OUT_OF_MEMORY: u8 = 0x03;
    pub const INVALID_PAYLOAD_LENGTH: u8 = 0x04;
    /// The payload type is valid but not accepted in the session's current
    /// state (e.g. a diagnostic message before routing activation).
    pub const INVALID_PAYLOAD_TYPE_IN_STATE: u8 = 0x06;
}

/// Routing activation response codes (payload type 0x0006).
///
/// 0x10 is the only success code; 0x00-0x0F are refusals.
pub mod activation_code {
    pub const DENIED_UNKNOWN_SOURCE: u8 = 0x06;
    pub const DENIED_MISSING_AUTHENTICATION: u8 = 0x0A;
    pub const SUCCESS: u8 = 0x10;
}

/// Diagnostic message positive ACK codes (payload type 0x8002).
pub mod diag_ack_code {
    pub const ACK: u8 = 0x00;
}

/// Diagnostic message negative ACK codes (payload type 0x8003).
pub mod diag_nack_code {
    pub const INVALID_SOURCE_ADDRESS: u8 = 0x02;
    pub const UNKNOWN_TARGET_ADDRESS: u8 = 0x03;
}

/// Generic Header NACK (0x0000): one code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericNack {
    pub code: u8,
}

/// Vehicle Identification Request (0x0001): empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentificationRequest;

/// Vehicle Identification Request by EID (0x0003).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentificationRequestEid {
    pub eid: [u8; 6],
}

/// Vehicle Announcement / Identification Response (0x0004): 33 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleAnnouncement {
    pub vin: [u8; 17],
    pub logical_address: u16,
    pub eid: [u8; 6],
    pub gid: [u8; 6],
    pub further_action: u8,
    pub sync_status: u8,
}

/// Routing Activation Request (0x0005): 7 bytes, or 11 with the
/// OEM-specific extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingActivationRequest {
    pub source_address: u16,
    pub activation_type: u8,
    pub reserved: [u8; 4],
    pub oem_specific: Option<[u8; 4]>,
}

/// Routing Activation Response (0x0006): 13 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingActivationResponse {
    pub tester_address: u16,
    pub entity_address: u16,
    pub code: u8,
    pub reserved: [u8; 4],
    pub oem_reserved: [u8; 4],
}

impl RoutingActivationResponse {
    pub fn new(tester_address: u16, entity_address: u16, code: u8) -> Self {
        Self {
            tester_address,
            entity_address,
            code,
            reserved: [0; 4],
            oem_reserved: [0; 4],
        }
    }
}

/// Alive Check Request (0x0007): empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveCheckRequest;

/// Alive Check Response (0x0008): the responder's logical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveCheckResponse {
    pub source_address: u16,
}

/// Entity Status Request (0x4001): empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityStatusRequest;

/// Entity Status Response (0x4002): 7 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityStatusResponse {
    pub node_type: u8,
    pub max_open_sockets: u8,
    pub open_sockets: u8,
    pub max_data_size: u32,
}

/// Diagnostic Power Mode Request (0x4003): empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerModeRequest;

/// Diagnostic Power Mode Response (0x4004): one status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerModeResponse {
    pub status: u8,
}

/// Diagnostic Message (0x8001): addresses plus at least one UDS byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub source_address: u16,
    pub target_address: u16,
    pub user_data: Vec<u8>,
}

/// Diagnostic Message Positive ACK (0x8002).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticAck {
    pub source_address: u16,
    pub target_address: u16,
    pub code: u8,
    /// Optional echo of the acknowledged message's leading UDS bytes.
    pub previous: Vec<u8>,
}

/// Diagnostic Message Negative ACK (0x8003).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticNack {
    pub source_address: u16,
    pub target_address: u16,
    pub code: u8,
    pub previous: Vec<u8>,
}

/// A decoded DoIP payload of any recognised type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoipPayload {
    GenericNack(GenericNack),
    VehicleIdentificationRequest(VehicleIdentificationRequest),
    VehicleIdentificationRequestEid(VehicleIdentificationRequestEid),
    VehicleAnnouncement(VehicleAnnouncement),
    RoutingActivationRequest(RoutingActivationRequest),
    RoutingActivationResponse(RoutingActivationResponse),
    AliveCheckRequest(AliveCheckRequest),
    AliveCheckResponse(AliveCheckResponse),
    EntityStatusRequest(EntityStatusRequest),
    EntityStatusResponse(EntityStatusResponse),
    PowerModeRequest(PowerModeRequest),
    PowerModeResponse(PowerModeResponse),
    DiagnosticMessage(DiagnosticMessage),
    DiagnosticAck(DiagnosticAck),
    DiagnosticNack(DiagnosticNack),
}

fn malformed(payload_type: PayloadType, reason: &'static str) -> DecodeError {
    DecodeError::MalformedBody {
        payload_type,
        reason,
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

impl DoipPayload {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            DoipPayload::GenericNack(_) => PayloadType::GenericNack,
            DoipPayload::VehicleIdentificationRequest(_) => {
                PayloadType::VehicleIdentificationRequest
            }
            DoipPayload::VehicleIdentificationRequestEid(_) => {
                PayloadType::VehicleIdentificationRequestEid
            }
            DoipPayload::VehicleAnnouncement(_) => PayloadType::VehicleAnnouncement,
            DoipPayload::RoutingActivationRequest(_) => PayloadType::RoutingActivationRequest,
            DoipPayload::RoutingActivationResponse(_) => PayloadType::RoutingActivationResponse,
            DoipPayload::AliveCheckRequest(_) => PayloadType::AliveCheckRequest,
            DoipPayload::AliveCheckResponse(_) => PayloadType::AliveCheckResponse,
            DoipPayload::EntityStatusRequest(_) => PayloadType::EntityStatusRequest,
            DoipPayload::EntityStatusResponse(_) => PayloadType::EntityStatusResponse,
            DoipPayload::PowerModeRequest(_) => PayloadType::PowerModeRequest,
            DoipPayload::PowerModeResponse(_) => PayloadType::PowerModeResponse,
            DoipPayload::DiagnosticMessage(_) => PayloadType::DiagnosticMessage,
            DoipPayload::DiagnosticAck(_) => PayloadType::DiagnosticAck,
            DoipPayload::DiagnosticNack(_) => PayloadType::DiagnosticNack,
        }
    }

    /// Append the body bytes (without header) to `buf`.
    pub fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            DoipPayload::GenericNack(nack) => buf.push(nack.code),
            DoipPayload::VehicleIdentificationRequest(_) => {}
            DoipPayload::VehicleIdentificationRequestEid(req) => buf.extend_from_slice(&req.eid),
            DoipPayload::VehicleAnnouncement(vam) => {
                buf.extend_from_slice(&vam.vin);
                buf.extend_from_slice(&vam.logical_address.to_be_bytes());
                buf.extend_from_slice(&vam.eid);
                buf.extend_from_slice(&vam.gid);
                buf.push(vam.further_action);
                buf.push(vam.sync_status);
            }
            DoipPayload::RoutingActivationRequest(req) => {
                buf.extend_from_slice(&req.source_address.to_be_bytes());
                buf.push(req.activation_type);
                buf.extend_from_slice(&req.reserved);
                if let Some(oem) = req.oem_specific {
                    buf.extend_from_slice(&oem);
                }
            }
            DoipPayload::RoutingActivationResponse(resp) => {
                buf.extend_from_slice(&resp.tester_address.to_be_bytes());
                buf.extend_from_slice(&resp.entity_address.to_be_bytes());
                buf.push(resp.code);
                buf.extend_from_slice(&resp.reserved);
                buf.extend_from_slice(&resp.oem_reserved);
            }
            DoipPayload::AliveCheckRequest(_) => {}
            DoipPayload::AliveCheckResponse(resp) => {
                buf.extend_from_slice(&resp.source_address.to_be_bytes());
            }
            DoipPayload::EntityStatusRequest(_) => {}
            DoipPayload::EntityStatusResponse(resp) => {
                buf.push(resp.node_type);
                buf.push(resp.max_open_sockets);
                buf.push(resp.open_sockets);
                buf.extend_from_slice(&resp.max_data_size.to_be_bytes());
            }
            DoipPayload::PowerModeRequest(_) => {}
            DoipPayload::PowerModeResponse(resp) => buf.push(resp.status),
            DoipPayload::DiagnosticMessage(diag) => {
                buf.extend_from_slice(&diag.source_address.to_be_bytes());
                buf.extend_from_slice(&diag.target_address.to_be_bytes());
                buf.extend_from_slice(&diag.user_data);
            }
            DoipPayload::DiagnosticAck(ack) => {
                buf.extend_from_slice(&ack.source_address.to_be_bytes());
                buf.extend_from_slice(&ack.target_address.to_be_bytes());
                buf.push(ack.code);
                buf.extend_from_slice(&ack.previous);
            }
            DoipPayload::DiagnosticNack(nack) => {
                buf.extend_from_slice(&nack.source_address.to_be_bytes());
                buf.extend_from_slice(&nack.target_address.to_be_bytes());
                buf.push(nack.code);
                buf.extend_from_slice(&nack.previous);
            }
        }
    }

    /// Decode a body of the given type. `body` must be exactly the declared
    /// payload bytes.
    pub fn decode_body(payload_type: PayloadType, body: &[u8]) -> Result<Self, DecodeError> {
        match payload_type {
            PayloadType::GenericNack => {
                if body.len() != 1 {
                    return Err(malformed(payload_type, "expected 1 code byte"));
                }
                Ok(DoipPayload::GenericNack(GenericNack { code: body[0] }))
            }
            PayloadType::VehicleIdentificationRequest => {
                if !body.is_empty() {
                    return Err(malformed(payload_type, "expected empty body"));
                }
                Ok(DoipPayload::VehicleIdentificationRequest(
                    VehicleIdentificationRequest,
                ))
            }
            PayloadType::VehicleIdentificationRequestEid => {
                if body.len() != 6 {
                    return Err(malformed(payload_type, "expected 6-byte EID"));
                }
                let mut eid = [0u8; 6];
                eid.copy_from_slice(body);
                Ok(DoipPayload::VehicleIdentificationRequestEid(
                    VehicleIdentificationRequestEid { eid },
                ))
            }
            PayloadType::VehicleAnnouncement => {
                if body.len() != 33 {
                    return Err(malformed(payload_type, "expected 33 bytes"));
                }
                let mut vin = [0u8; 17];
                vin.copy_from_slice(&body[0..17]);
                let mut eid = [0u8; 6];
                eid.copy_from_slice(&body[19..25]);
                let mut gid = [0u8; 6];
                gid.copy_from_slice(&body[25..31]);
                Ok(DoipPayload::VehicleAnnouncement(VehicleAnnouncement {
                    vin,
                    logical_address: read_u16(body, 17),
                    eid,
                    gid,
                    further_action: body[31],
                    sync_status: body[32],
                }))
            }
            PayloadType::RoutingActivationRequest => {
                if body.len() != 7 && body.len() != 11 {
                    return Err(malformed(payload_type, "expected 7 or 11 bytes"));
                }
                let mut reserved = [0u8; 4];
                reserved.copy_from_slice(&body[3..7]);
                let oem_specific = if body.len() == 11 {
                    let mut oem = [0u8; 4];
                    oem.copy_from_slice(&body[7..11]);
                    Some(oem)
                } else {
                    None
                };
                Ok(DoipPayload::RoutingActivationRequest(
                    RoutingActivationRequest {
                        source_address: read_u16(body, 0),
                        activation_type: body[2],
                        reserved,
                        oem_specific,
                    },
                ))
            }
            PayloadType::RoutingActivationResponse => {
                if body.len() != 13 {
                    return Err(malformed(payload_type, "expected 13 bytes"));
                }
                let mut reserved = [0u8; 4];
                reserved.copy_from_slice(&body[5..9]);
                let mut oem_reserved = [0u8; 4];
                oem_reserved.copy_from_slice(&body[9..13]);
                Ok(DoipPayload::RoutingActivationResponse(
                    RoutingActivationResponse {
                        tester_address: read_u16(body, 0),
                        entity_address: read_u16(body, 2),
                        code: body[4],
                        reserved,
                        oem_reserved,
                    },
                ))
            }
            PayloadType::AliveCheckRequest => {
                if !body.is_empty() {
                    return Err(malformed(payload_type, "expected empty body"));
                }
                Ok(DoipPayload::AliveCheckRequest(AliveCheckRequest))
            }
            PayloadType::AliveCheckResponse => {
                if body.len() != 2 {
                    return Err(malformed(payload_type, "expected 2-byte address"));
                }
                Ok(DoipPayload::AliveCheckResponse(AliveCheckResponse {
                    source_address: read_u16(body, 0),
                }))
            }
            PayloadType::EntityStatusRequest => {
                if !body.is_empty() {
                    return Err(malformed(payload_type, "expected empty body"));
                }
                Ok(DoipPayload::EntityStatusRequest(EntityStatusRequest))
            }
            PayloadType::EntityStatusResponse => {
                if body.len() != 7 {
                    return Err(malformed(payload_type, "expected 7 bytes"));
                }
                Ok(DoipPayload::EntityStatusResponse(EntityStatusResponse {
                    node_type: body[0],
                    max_open_sockets: body[1],
                    open_sockets: body[2],
                    max_data_size: u32::from_be_bytes([body[3], body[4], body[5], body[6]]),
                }))
            }
            PayloadType::PowerModeRequest => {
                if !body.is_empty() {
                    return Err(malformed(payload_type, "expected empty body"));
                }
                Ok(DoipPayload::PowerModeRequest(PowerModeRequest))
            }
            PayloadType::PowerModeResponse => {
                // Status is a single byte; the two-byte form was a historical
                // layout bug.
                if body.len() != 1 {
                    return Err(malformed(payload_type, "expected 1 status byte"));
                }
                Ok(DoipPayload::PowerModeResponse(PowerModeResponse {
                    status: body[0],
                }))
            }
            PayloadType::DiagnosticMessage => {
                if body.len() < 5 {
                    return Err(malformed(
                        payload_type,
                        "expected addresses plus at least one UDS byte",
                    ));
                }
                Ok(DoipPayload::DiagnosticMessage(DiagnosticMessage {
                    source_address: read_u16(body, 0),
                    target_address: read_u16(body, 2),
                    user_data: body[4..].to_vec(),
                }))
            }
            PayloadType::DiagnosticAck => {
                if body.len() < 5 {
                    return Err(malformed(payload_type, "expected at least 5 bytes"));
                }
                Ok(DoipPayload::DiagnosticAck(DiagnosticAck {
                    source_address: read_u16(body, 0),
                    target_address: read_u16(body, 2),
                    code: body[4],
                    previous: body[5..].to_vec(),
                }))
            }
            PayloadType::DiagnosticNack => {
                if body.len() < 5 {
                    return Err(malformed(payload_type, "expected at least 5 bytes"));
                }
                Ok(DoipPayload::DiagnosticNack(DiagnosticNack {
                    source_address: read_u16(body, 0),
                    target_address: read_u16(body, 2),
                    code: body[4],
                    previous: body[5..].to_vec(),
                }))
            }
            PayloadType::Unknown(value) => Err(DecodeError::UnknownPayloadType(value)),
        }
    }
}
