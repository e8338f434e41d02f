//! Whole-message encoding and framed async I/O

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DecodeError;
use crate::header::{DoipHeader, DOIP_HEADER_LENGTH};
use crate::payload::DoipPayload;

/// Upper bound on the declared payload length the codec will read. DoIP
/// diagnostic payloads in this gateway are short scripted responses, so
/// 64 KiB leaves ample headroom while bounding per-frame allocation.
pub const MAX_PAYLOAD_LENGTH: u32 = 0x0001_0000;

/// A complete DoIP message: protocol version plus typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoipMessage {
    pub protocol_version: u8,
    pub payload: DoipPayload,
}

impl DoipMessage {
    pub fn new(protocol_version: u8, payload: DoipPayload) -> Self {
        Self {
            protocol_version,
            payload,
        }
    }

    /// Encode header and body into a single buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.payload.encode_body(&mut body);
        let header = DoipHeader::new(
            self.protocol_version,
            self.payload.payload_type(),
            body.len() as u32,
        );
        let mut out = Vec::with_capacity(DOIP_HEADER_LENGTH + body.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&body);
        out
    }

    /// Decode a message from a single buffer (one UDP datagram).
    ///
    /// The declared payload length must fit within `buf`; trailing bytes
    /// beyond it are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = DoipHeader::decode(buf)?;
        if header.payload_length > MAX_PAYLOAD_LENGTH {
            return Err(DecodeError::BadLength {
                declared: header.payload_length,
                limit: MAX_PAYLOAD_LENGTH,
            });
        }
        let end = DOIP_HEADER_LENGTH + header.payload_length as usize;
        if buf.len() < end {
            return Err(DecodeError::ShortBuffer {
                needed: end,
                have: buf.len(),
            });
        }
        let payload = DoipPayload::decode_body(header.payload_type, &buf[DOIP_HEADER_LENGTH..end])?;
        Ok(Self {
            protocol_version: header.protocol_version,
            payload,
        })
    }
}

/// Failure reading a framed message from a stream.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer closed the connection at a frame boundary.
    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Read one framed DoIP message from `reader`.
///
/// Reads exactly the 8-byte header, validates it, then reads the declared
/// payload. EOF before the first header byte is reported as
/// [`ReadError::Closed`].
pub async fn read_message<R>(reader: &mut R) -> Result<DoipMessage, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; DOIP_HEADER_LENGTH];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(ReadError::Closed),
        Err(e) => return Err(ReadError::Io(e)),
    }

    let header = DoipHeader::decode(&header_buf)?;
    if header.payload_length > MAX_PAYLOAD_LENGTH {
        return Err(ReadError::Decode(DecodeError::BadLength {
            declared: header.payload_length,
            limit: MAX_PAYLOAD_LENGTH,
        }));
    }

    let mut body = vec![0u8; header.payload_length as usize];
    reader.read_exact(&mut body).await?;

    let payload = DoipPayload::decode_body(header.payload_type, &body)?;
    Ok(DoipMessage {
        protocol_version: header.protocol_version,
        payload,
    })
}

/// Write one framed DoIP message to `writer` and flush it.
pub async fn write_message<W>(writer: &mut W, message: &DoipMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{
        activation_code, DiagnosticMessage, PowerModeResponse, RoutingActivationResponse,
    };

    #[test]
    fn test_message_roundtrip() {
        let msg = DoipMessage::new(
            0x02,
            DoipPayload::DiagnosticMessage(DiagnosticMessage {
                source_address: 0x0E00,
                target_address: 0x1000,
                user_data: vec![0x22, 0xF1, 0x90],
            }),
        );
        let bytes = msg.encode();
        assert_eq!(
            bytes,
            vec![0x02, 0xFD, 0x80, 0x01, 0x00, 0x00, 0x00, 0x07, 0x0E, 0x00, 0x10, 0x00, 0x22, 0xF1, 0x90]
        );
        assert_eq!(DoipMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_routing_activation_response_bytes() {
        let msg = DoipMessage::new(
            0x02,
            DoipPayload::RoutingActivationResponse(RoutingActivationResponse::new(
                0x0E00,
                0x1000,
                activation_code::SUCCESS,
            )),
        );
        assert_eq!(
            msg.encode(),
            vec![
                0x02, 0xFD, 0x00, 0x06, 0x00, 0x00, 0x00, 0x0D, 0x0E, 0x00, 0x10, 0x00, 0x10,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_power_mode_response_is_nine_bytes_total() {
        let msg = DoipMessage::new(
            0x02,
            DoipPayload::PowerModeResponse(PowerModeResponse { status: 0x01 }),
        );
        assert_eq!(
            msg.encode(),
            vec![0x02, 0xFD, 0x40, 0x04, 0x00, 0x00, 0x00, 0x01, 0x01]
        );
    }

    #[test]
    fn test_decode_rejects_overlong_declared_length() {
        let mut buf = vec![0x02, 0xFD, 0x80, 0x01];
        buf.extend_from_slice(&(MAX_PAYLOAD_LENGTH + 1).to_be_bytes());
        assert!(matches!(
            DoipMessage::decode(&buf),
            Err(DecodeError::BadLength { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        // Declares 7 payload bytes but carries 3.
        let buf = vec![0x02, 0xFD, 0x80, 0x01, 0x00, 0x00, 0x00, 0x07, 0x0E, 0x00, 0x10];
        assert!(matches!(
            DoipMessage::decode(&buf),
            Err(DecodeError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn test_zero_length_identification_request() {
        let buf = [0x02, 0xFD, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        let msg = DoipMessage::decode(&buf).unwrap();
        assert!(matches!(
            msg.payload,
            DoipPayload::VehicleIdentificationRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_framed_read_write() {
        let msg = DoipMessage::new(
            0x02,
            DoipPayload::DiagnosticMessage(DiagnosticMessage {
                source_address: 0x0E00,
                target_address: 0x1000,
                user_data: vec![0x3E, 0x00],
            }),
        );
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).await.unwrap();

        let mut reader = buf.as_slice();
        let read = read_message(&mut reader).await.unwrap();
        assert_eq!(read, msg);

        // A second read hits clean EOF.
        assert!(matches!(
            read_message(&mut reader).await,
            Err(ReadError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_framed_read_two_back_to_back() {
        let a = DoipMessage::new(0x02, DoipPayload::AliveCheckRequest(crate::AliveCheckRequest));
        let b = DoipMessage::new(
            0x02,
            DoipPayload::AliveCheckResponse(crate::AliveCheckResponse {
                source_address: 0x1000,
            }),
        );
        let mut buf = Vec::new();
        buf.extend_from_slice(&a.encode());
        buf.extend_from_slice(&b.encode());

        let mut reader = buf.as_slice();
        assert_eq!(read_message(&mut reader).await.unwrap(), a);
        assert_eq!(read_message(&mut reader).await.unwrap(), b);
    }
}
