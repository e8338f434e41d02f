//! Decode failure taxonomy

use thiserror::Error;

use crate::header::PayloadType;
use crate::payload::nack_code;

/// Reasons a DoIP frame fails to decode.
///
/// Only [`ShortBuffer`](DecodeError::ShortBuffer) and
/// [`BadInverse`](DecodeError::BadInverse) warrant a Generic Header NACK
/// reply; the other variants drop the frame (and close the TCP session).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Fewer bytes available than the header or declared length requires.
    #[error("buffer too short: need {needed} bytes, have {have}")]
    ShortBuffer { needed: usize, have: usize },

    /// The inverse protocol version is not the bitwise complement of the
    /// protocol version.
    #[error("inverse protocol version 0x{inverse:02X} does not complement 0x{version:02X}")]
    BadInverse { version: u8, inverse: u8 },

    /// The declared payload length exceeds the codec limit.
    #[error("declared payload length {declared} exceeds limit {limit}")]
    BadLength { declared: u32, limit: u32 },

    /// The payload type is not one the gateway recognises.
    #[error("unknown payload type 0x{0:04X}")]
    UnknownPayloadType(u16),

    /// The payload type is known but its body does not match the required
    /// layout.
    #[error("malformed {payload_type:?} body: {reason}")]
    MalformedBody {
        payload_type: PayloadType,
        reason: &'static str,
    },
}

impl DecodeError {
    /// The Generic Header NACK code to send for this failure, if the
    /// protocol defines one.
    pub fn nack_code(&self) -> Option<u8> {
        match self {
            DecodeError::ShortBuffer { .. } => Some(nack_code::INVALID_PAYLOAD_LENGTH),
            DecodeError::BadInverse { .. } => Some(nack_code::INCORRECT_PATTERN_FORMAT),
            _ => None,
        }
    }
}
