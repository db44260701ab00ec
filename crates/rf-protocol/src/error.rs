//! Protocol error types

use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur during channel protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An outbound payload could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encoding(#[source] serde_json::Error),

    /// An inbound frame could not be parsed
    #[error("Failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// Push attempted on a channel that has not completed its join
    #[error("Channel {topic} is not joined")]
    NotJoined { topic: String },

    /// Join attempted on a channel that is already joining or joined
    #[error("Channel {topic} has already been joined")]
    AlreadyJoined { topic: String },

    /// The server replied to a join with a non-ok status
    #[error("Join of {topic} rejected: {response}")]
    JoinRejected { topic: String, response: Value },

    /// No heartbeat acknowledgment arrived within one interval
    #[error("Heartbeat timed out")]
    HeartbeatTimeout,

    /// No acknowledgment arrived before the deadline
    #[error("Timed out waiting for reply to {event}")]
    ReplyTimeout { event: String },

    /// The socket closed before the operation completed
    #[error("Socket closed")]
    Closed,
}
