//! rf-protocol: Phoenix channel protocol for the ranching.farm agent
//!
//! This crate implements topic-scoped join, push-with-acknowledgment and
//! event subscription multiplexed over a single transport connection. The
//! wire format is the Phoenix V2 JSON serializer.

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod socket;
pub mod transport;

pub use channel::{Channel, ChannelState, Push, Subscription};
pub use error::ProtocolError;
pub use message::{Message, Reply, ReplyStatus, PROTOCOL_VSN};
pub use socket::{Socket, SocketOptions};
pub use transport::{Connector, Transport, TransportError, WebSocketConnector};
