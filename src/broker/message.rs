//! Message definitions for the relay
//!
//! A `Message` is an opaque payload tagged text or binary. It wraps the
//! reference-counted buffers `tungstenite` already uses, so cloning a message
//! for each recipient of a relay does not copy the payload.

use tungstenite::protocol::Message as WsMessage;
use tungstenite::{Bytes, Utf8Bytes};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Message {
    pub fn text(payload: impl Into<Utf8Bytes>) -> Self {
        Message::Text(payload.into())
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Message::Binary(payload.into())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_str().as_bytes(),
            Message::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// Data frames become messages; control frames are left to the transport.
    pub fn from_ws(frame: WsMessage) -> Option<Self> {
        match frame {
            WsMessage::Text(text) => Some(Message::Text(text)),
            WsMessage::Binary(bytes) => Some(Message::Binary(bytes)),
            _ => None,
        }
    }
}

impl From<Message> for WsMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => WsMessage::Text(text),
            Message::Binary(bytes) => WsMessage::Binary(bytes),
        }
    }
}
