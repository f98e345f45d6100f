//! Wire protocol shared by the relay server and the chat client
//!
//! Every message travels as one length-prefixed frame. The payload is raw
//! bytes; by convention it carries UTF-8 text.

mod message;

pub use message::{Message, MessageKind, SERVER_TAG};

use thiserror::Error;

/// Size of the frame length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Hard ceiling for a single frame payload (10 MB)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Default payload limit applied when nothing else is configured (1 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u32, max: u32 },

    #[error("Connection closed in the middle of a frame")]
    TruncatedFrame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame a payload with its length prefix
///
/// Frame format: [4-byte length BE][payload]
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Check a decoded length prefix against the negotiated limit
pub fn check_frame_length(length: u32, max: u32) -> Result<usize, ProtocolError> {
    let max = max.min(MAX_MESSAGE_SIZE);
    if length > max {
        return Err(ProtocolError::MessageTooLarge { size: length, max });
    }
    Ok(length as usize)
}
