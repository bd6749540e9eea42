//! Outbound command seam
//!
//! The core does not encode commands. A collaborator produces the raw byte
//! payload for each domain operation and the link treats it as an
//! uninterpreted buffer.

use bytes::Bytes;

/// An outbound, pre-encoded command payload.
pub trait Command {
    /// Raw wire payload for this command, excluding the length header.
    fn to_bytes(&self) -> Bytes;
}

impl Command for Bytes {
    fn to_bytes(&self) -> Bytes {
        self.clone()
    }
}

impl Command for Vec<u8> {
    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl Command for &[u8] {
    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}
