//! In-process transport used to drive the protocol without a network

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::{Connector, Transport, TransportError};

/// One end of an in-memory duplex pipe
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

/// Connector handing the far end of every new pipe to a receiver.
///
/// Connecting fails with [`TransportError::Connect`] once the receiver has
/// been dropped, which lets callers model an unreachable endpoint.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<MemoryTransport>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryTransport>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (Self { accepted }, rx)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (client, server) = MemoryTransport::pair();
        self.accepted
            .send(server)
            .map_err(|_| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            })?;
        Ok(Box::new(client))
    }
}
