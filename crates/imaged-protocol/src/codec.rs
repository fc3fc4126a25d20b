use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ImagedMessage, MAX_MESSAGE_SIZE};

/// Length of the frame header: 4 bytes length plus 1 byte tag.
pub const FRAME_HEADER_LEN: usize = 5;

/// Codec for encoding/decoding imaged protocol messages.
pub struct ImagedCodec;

impl ImagedCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][payload]
    ///
    /// `len` is big-endian and counts the tag plus the payload.
    pub fn encode(msg: &ImagedMessage) -> ProtocolResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge { size: payload.len(), max: MAX_MESSAGE_SIZE });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// [`encode`](Self::encode) into a shareable buffer.
    pub fn encode_bytes(msg: &ImagedMessage) -> ProtocolResult<Bytes> {
        Self::encode(msg).map(Bytes::from)
    }

    /// Decode a framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(ImagedMessage, usize)> {
        Self::decode_with_limit(data, MAX_MESSAGE_SIZE)
    }

    /// Decode a framed message whose payload may be at most `max` bytes.
    pub fn decode_with_limit(data: &[u8], max: usize) -> ProtocolResult<(ImagedMessage, usize)> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > max {
            return Err(ProtocolError::MessageTooLarge { size: len - 1, max });
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let tag = data[4];
        let msg = Self::decode_payload(&data[FRAME_HEADER_LEN..total])?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        Ok((msg, total))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &ImagedMessage) -> ProtocolResult<Vec<u8>> {
        bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<ImagedMessage> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
