//! Text codec for protocol frames
//!
//! Frames travel as WebSocket text messages, so the codec is a thin layer
//! over `serde_json` that maps failures onto [`ProtocolError`].

use crate::error::ProtocolError;
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }

    /// Encode a frame into its text form
    pub fn encode(&self, message: &Message) -> Result<String, ProtocolError> {
        serde_json::to_string(message).map_err(ProtocolError::Encoding)
    }

    /// Decode a frame from its text form
    pub fn decode(&self, text: &str) -> Result<Message, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
