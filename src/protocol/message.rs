//! Relay message types and their text rendering

use super::MAX_MESSAGE_SIZE;
use std::sync::Arc;

/// Tag used for announcements generated by the relay itself
pub const SERVER_TAG: &str = "[SERVER]";

const JOIN_SUFFIX: &str = " has joined the chat.";
const LEAVE_SUFFIX: &str = " has left the chat.";

/// What produced a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A session finished its handshake
    Join,
    /// A session sent a chat line
    Chat,
    /// A session left the relay
    Leave,
}

/// A message on its way to the other sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub body: Vec<u8>,
    pub kind: MessageKind,
}

impl Message {
    pub fn join(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: Vec::new(),
            kind: MessageKind::Join,
        }
    }

    pub fn chat(sender: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            kind: MessageKind::Chat,
        }
    }

    pub fn leave(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: Vec::new(),
            kind: MessageKind::Leave,
        }
    }

    /// Render the payload delivered to peers
    ///
    /// Chat bodies are passed through untouched after the `[sender]: ` tag, so
    /// non-UTF-8 payloads survive the relay byte-for-byte.
    pub fn render(&self) -> Arc<[u8]> {
        match self.kind {
            MessageKind::Chat => {
                let mut out = format!("[{}]: ", self.sender).into_bytes();
                out.extend_from_slice(&self.body);
                out.into()
            }
            MessageKind::Join => format!("{} {}{}", SERVER_TAG, self.sender, JOIN_SUFFIX)
                .into_bytes()
                .into(),
            MessageKind::Leave => format!("{} {}{}", SERVER_TAG, self.sender, LEAVE_SUFFIX)
                .into_bytes()
                .into(),
        }
    }

    /// Length in bytes of what [`Message::render`] produces
    pub fn rendered_len(&self) -> usize {
        match self.kind {
            MessageKind::Chat => self.sender.len() + "[]: ".len() + self.body.len(),
            MessageKind::Join => SERVER_TAG.len() + 1 + self.sender.len() + JOIN_SUFFIX.len(),
            MessageKind::Leave => SERVER_TAG.len() + 1 + self.sender.len() + LEAVE_SUFFIX.len(),
        }
    }

    /// Whether the rendered payload fits in a single frame
    pub fn fits_frame(&self) -> bool {
        self.rendered_len() <= MAX_MESSAGE_SIZE as usize
    }
}
