//! Core domain types

use serde::Serialize;
use std::fmt;

/// Opaque identifier of the managed cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Channel topic addressing this cluster
    pub fn topic(&self) -> String {
        format!("cluster:{}", self.0)
    }
}

/// One node of the cluster as announced to the control-plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub status: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Ordered node listing; serializes as the `info` payload `{"nodes": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeInfo>,
}

impl ClusterSnapshot {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

/// Lifecycle of the remote command session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Disconnected,
    /// Establishing the transport
    Connecting,
    /// Transport up, channel not joined yet
    Connected,
    /// Join sent
    Joining,
    /// Join acknowledged
    Joined,
    /// Announcement sent and commands being served
    Serving,
    /// Waiting to reconnect after the connection was lost
    Reconnecting,
    /// Unrecoverable failure
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Joining => write!(f, "joining"),
            SessionState::Joined => write!(f, "joined"),
            SessionState::Serving => write!(f, "serving"),
            SessionState::Reconnecting => write!(f, "reconnecting"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}
