//! Length-prefixed framing for the EV3 wire protocol
//!
//! Every message, inbound or outbound, is framed as:
//! ```text
//! [ 2 bytes: payload length (u16, little-endian) ][ N bytes: payload ]
//! ```
//!
//! The fixed 2-byte header keeps framing allocation-free and bounds a single
//! frame to 65535 payload bytes.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 2;

/// Maximum payload carried by a single frame
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Errors that can occur when framing an outbound payload
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload too large: {0} bytes (max: {MAX_PAYLOAD_LEN})")]
    PayloadTooLarge(usize),

    #[error("empty payload")]
    Empty,
}

/// Encode a payload length as the 2-byte little-endian wire header.
pub fn encode_length(n: u16) -> [u8; 2] {
    n.to_le_bytes()
}

/// Decode the 2-byte wire header. `b0` is the first byte on the wire.
///
/// Total function: any two bytes decode to a valid length.
pub fn decode_length(b0: u8, b1: u8) -> u16 {
    (b1 as u16) << 8 | b0 as u16
}

/// Frame an outbound payload as `[length][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::Empty);
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&encode_length(payload.len() as u16));
    buf.put_slice(payload);
    Ok(buf.freeze())
}
