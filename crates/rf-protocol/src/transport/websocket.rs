//! WebSocket transport

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Connector, Transport, TransportError};
use crate::message::PROTOCOL_VSN;

/// Build the socket URL for an endpoint.
///
/// Appends the `/websocket` transport segment and the `vsn` query parameter
/// unless the endpoint already carries them.
pub fn socket_url(endpoint: &Url) -> Result<Url, TransportError> {
    match endpoint.scheme() {
        "ws" | "wss" => {}
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    }

    let mut url = endpoint.clone();
    if !url.path().trim_end_matches('/').ends_with("/websocket") {
        let path = format!("{}/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    if !url.query_pairs().any(|(key, _)| key == "vsn") {
        url.query_pairs_mut().append_pair("vsn", PROTOCOL_VSN);
    }
    Ok(url)
}

/// Connects to a Phoenix socket endpoint over WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let url = socket_url(endpoint)?;
        tracing::debug!("Opening WebSocket to {}", url);

        let (stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                endpoint: endpoint.to_string(),
            })?
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("WebSocket handshake completed ({})", response.status());
        Ok(Box::new(WebSocketTransport::new(stream)))
    }
}

/// WebSocket implementation of the [`Transport`] trait
pub struct WebSocketTransport<S = MaybeTlsStream<TcpStream>> {
    stream: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        tracing::warn!("Dropping non UTF-8 binary frame: {}", e);
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    tracing::debug!("WebSocket closed by peer: {:?}", frame);
                    return None;
                }
                // Ping/pong are answered by tungstenite itself
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_appends_transport_and_vsn() {
        let endpoint = Url::parse("wss://ranching.farm/socket/kubernetes/cluster").unwrap();
        let url = socket_url(&endpoint).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://ranching.farm/socket/kubernetes/cluster/websocket?vsn=2.0.0"
        );
    }

    #[test]
    fn test_socket_url_keeps_existing_parts() {
        let endpoint = Url::parse("ws://localhost:4000/socket/websocket?vsn=1.0.0&token=x").unwrap();
        let url = socket_url(&endpoint).unwrap();
        assert_eq!(url.path(), "/socket/websocket");
        let vsn: Vec<_> = url.query_pairs().filter(|(k, _)| k == "vsn").collect();
        assert_eq!(vsn.len(), 1);
        assert_eq!(vsn[0].1, "1.0.0");
    }

    #[test]
    fn test_socket_url_rejects_http() {
        let endpoint = Url::parse("https://ranching.farm/socket").unwrap();
        assert!(matches!(
            socket_url(&endpoint),
            Err(TransportError::UnsupportedScheme(s)) if s == "https"
        ));
    }
}
