//! DoIP (Diagnostics over IP) wire protocol codec per ISO 13400-2.
//!
//! Every DoIP frame is an 8-byte header (protocol version, inverse version,
//! payload type, payload length) followed by a payload whose layout depends
//! on the payload type. This crate provides the typed payload structs, the
//! header codec, whole-message encode/decode for datagram transports, and
//! framed async read/write for TCP streams.
//!
//! The codec is transport-agnostic: it never opens sockets and holds no
//! state beyond the bytes it is given.

mod codec;
mod error;
mod header;
mod payload;

pub use codec::{read_message, write_message, DoipMessage, ReadError, MAX_PAYLOAD_LENGTH};
pub use error::DecodeError;
pub use header::{DoipHeader, PayloadType, DEFAULT_PROTOCOL_VERSION, DOIP_HEADER_LENGTH};
pub use payload::{
    activation_code, diag_ack_code, diag_nack_code, nack_code, AliveCheckRequest,
    AliveCheckResponse, DiagnosticAck, DiagnosticMessage, DiagnosticNack, DoipPayload,
    EntityStatusRequest, EntityStatusResponse, GenericNack, PowerModeRequest, PowerModeResponse,
    RoutingActivationRequest, RoutingActivationResponse, VehicleAnnouncement,
    VehicleIdentificationRequest, VehicleIdentificationRequestEid,
};
