//! Connection lifecycle: connect, join, announce, serve, reconnect

mod orchestrator;
mod reconnect;

use rf_core::ConfigError;
use rf_protocol::ProtocolError;
use thiserror::Error;

pub use orchestrator::SessionOrchestrator;
pub use reconnect::ExponentialBackoff;

/// Reasons a session ends unsuccessfully
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The transport could not be established
    #[error("Failed to connect: {0}")]
    Connect(#[source] ProtocolError),

    /// The channel join was rejected or not acknowledged
    #[error("Failed to join channel: {0}")]
    Join(#[source] ProtocolError),

    /// An established connection was lost and reconnecting is disabled
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),
}
