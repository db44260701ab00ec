//! Transports carrying protocol frames
//!
//! A transport is a duplex stream of text messages to a fixed endpoint.
//! The socket layer is written against the [`Transport`] and [`Connector`]
//! traits so the protocol stays independent of WebSocket.

mod memory;
mod websocket;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub use memory::{MemoryConnector, MemoryTransport};
pub use websocket::{socket_url, WebSocketConnector, WebSocketTransport};

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint is not a ws:// or wss:// URL
    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// The endpoint could not be reached or refused the handshake
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The connection attempt did not finish in time
    #[error("Connection to {endpoint} timed out")]
    ConnectTimeout { endpoint: String },

    /// Error on an established WebSocket
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer is gone
    #[error("Connection closed")]
    Closed,
}

/// A connected duplex text-message stream
#[async_trait]
pub trait Transport: Send {
    /// Send one text message
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text message.
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: the socket driver polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new transport to `endpoint`
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>, TransportError>;
}
