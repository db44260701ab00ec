//! Message types for the Phoenix channel protocol
//!
//! Every frame on the wire is a Phoenix V2 message: a five element JSON
//! array `[join_ref, ref, topic, event, payload]`.
//!
//! # Message Flow
//!
//! 1. Client sends `phx_join` on a topic, server answers with `phx_reply`
//! 2. Client pushes events, each answered by a `phx_reply` with the same ref
//! 3. Server pushes events (e.g. `cmd`) carrying no ref
//! 4. Client sends `heartbeat` on the `phoenix` topic every interval
//! 5. Server may send `phx_error` / `phx_close` to tear a channel down

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializer version announced in the connection URL (`vsn` parameter).
pub const PROTOCOL_VSN: &str = "2.0.0";

/// Reserved event and topic names
pub mod events {
    /// Join request
    pub const JOIN: &str = "phx_join";
    /// Reply to a push or join
    pub const REPLY: &str = "phx_reply";
    /// Channel crashed on the server
    pub const ERROR: &str = "phx_error";
    /// Channel closed by the server
    pub const CLOSE: &str = "phx_close";
    /// Leave request
    pub const LEAVE: &str = "phx_leave";
    /// Socket-level heartbeat
    pub const HEARTBEAT: &str = "heartbeat";
    /// Topic used for socket-level messages
    pub const PHOENIX_TOPIC: &str = "phoenix";
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Ref of the join that established the channel, if any
    pub join_ref: Option<String>,
    /// Ref used to correlate a reply with its request
    pub msg_ref: Option<String>,
    /// Channel topic
    pub topic: String,
    /// Event name
    pub event: String,
    /// Event payload
    pub payload: Value,
}

impl Message {
    /// Create a new message
    pub fn new(
        join_ref: Option<String>,
        msg_ref: Option<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            msg_ref,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build a heartbeat frame
    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new(
            None,
            Some(msg_ref),
            events::PHOENIX_TOPIC,
            events::HEARTBEAT,
            Value::Object(Default::default()),
        )
    }

    /// Whether this frame answers a previous request
    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    /// Whether this frame replies to the join identified by its own ref
    pub fn is_join_reply(&self) -> bool {
        self.is_reply() && self.join_ref.is_some() && self.join_ref == self.msg_ref
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (
            &self.join_ref,
            &self.msg_ref,
            &self.topic,
            &self.event,
            &self.payload,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (join_ref, msg_ref, topic, event, payload) =
            <(Option<String>, Option<String>, String, String, Value)>::deserialize(deserializer)?;
        Ok(Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        })
    }
}

/// Status carried by a `phx_reply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
    /// Any other status string sent by the server
    Other(String),
}

impl ReplyStatus {
    fn parse(status: &str) -> Self {
        match status {
            "ok" => Self::Ok,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Acknowledgment of a join or push
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub response: Value,
}

impl Reply {
    /// Extract the reply from a `phx_reply` payload of the form
    /// `{"status": "...", "response": {...}}`.
    pub fn from_payload(payload: &Value) -> Self {
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(ReplyStatus::parse)
            .unwrap_or_else(|| ReplyStatus::Other(String::new()));
        let response = payload.get("response").cloned().unwrap_or(Value::Null);
        Self { status, response }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}
