//! Socket: one transport connection multiplexing many channels
//!
//! A single driver task owns the transport. Outbound frames reach it over an
//! unbounded queue; inbound frames are routed to pending replies (by ref),
//! to channel state (join replies, `phx_error`, `phx_close`) or to event
//! subscribers (by topic and event).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use crate::channel::{Channel, ChannelShared, ChannelState};
use crate::codec::MessageCodec;
use crate::error::ProtocolError;
use crate::message::{events, Message, Reply};
use crate::transport::{Connector, Transport, TransportError};

/// Lower bound for the heartbeat period
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Socket tuning
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// How often a heartbeat is sent on the `phoenix` topic. A heartbeat
    /// still unacknowledged at the next tick fails the connection.
    pub heartbeat_interval: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Work item for the driver task
pub(crate) enum Outbound {
    Frame(Message),
    Close,
}

/// A reply slot waiting for its `phx_reply`
pub(crate) struct PendingReply {
    pub(crate) event: String,
    pub(crate) tx: oneshot::Sender<Reply>,
}

/// State shared between the socket handle, its channels and the driver
pub(crate) struct SocketShared {
    next_ref: AtomicU64,
    pub(crate) pending: DashMap<String, PendingReply>,
    pub(crate) subscriptions: DashMap<(String, String), mpsc::UnboundedSender<Value>>,
    pub(crate) channels: DashMap<String, Arc<ChannelShared>>,
}

impl SocketShared {
    fn new() -> Self {
        Self {
            next_ref: AtomicU64::new(0),
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    /// Allocate the next message ref
    pub(crate) fn make_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Route one inbound frame
    fn route(&self, message: Message, pending_heartbeat: &mut Option<String>) {
        if message.topic == events::PHOENIX_TOPIC && message.is_reply() {
            if pending_heartbeat.is_some() && *pending_heartbeat == message.msg_ref {
                tracing::trace!("Heartbeat acknowledged");
                *pending_heartbeat = None;
            }
            return;
        }

        match message.event.as_str() {
            events::REPLY => self.route_reply(message),
            events::ERROR => {
                tracing::warn!("Channel {} errored on the server", message.topic);
                self.set_channel_state(&message, ChannelState::Errored);
            }
            events::CLOSE => {
                tracing::info!("Channel {} closed by the server", message.topic);
                self.set_channel_state(&message, ChannelState::Closed);
            }
            _ => self.route_event(message),
        }
    }

    fn route_reply(&self, message: Message) {
        let reply = Reply::from_payload(&message.payload);

        if message.is_join_reply() {
            if let Some(channel) = self.channels.get(&message.topic) {
                channel.on_join_reply(message.join_ref.as_deref(), &reply);
            }
        }

        let Some(msg_ref) = message.msg_ref.as_deref() else {
            tracing::debug!("Reply without ref on {}", message.topic);
            return;
        };

        match self.pending.remove(msg_ref) {
            Some((_, pending)) => {
                if pending.event == events::LEAVE {
                    self.set_channel_state(&message, ChannelState::Closed);
                }
                // Receiver may have given up waiting
                let _ = pending.tx.send(reply);
            }
            None => tracing::debug!("Reply for unknown ref {} on {}", msg_ref, message.topic),
        }
    }

    fn route_event(&self, message: Message) {
        let key = (message.topic, message.event);
        let delivered = match self.subscriptions.get(&key) {
            Some(subscriber) => subscriber.send(message.payload).is_ok(),
            None => {
                tracing::debug!("No subscriber for {} on {}", key.1, key.0);
                return;
            }
        };
        if !delivered {
            tracing::debug!("Subscriber for {} on {} went away", key.1, key.0);
            self.subscriptions.remove(&key);
        }
    }

    fn set_channel_state(&self, message: &Message, state: ChannelState) {
        if let Some(channel) = self.channels.get(&message.topic) {
            channel.transition(message.join_ref.as_deref(), state);
        }
    }

    /// Fail everything that depends on the connection
    fn teardown(&self) {
        for channel in self.channels.iter() {
            channel.on_disconnect();
        }
        self.pending.clear();
        self.subscriptions.clear();
    }
}

/// Handle to a connected socket
pub struct Socket {
    shared: Arc<SocketShared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    driver: Option<JoinHandle<Result<(), ProtocolError>>>,
}

impl Socket {
    /// Connect to `endpoint` and start the driver task
    pub async fn connect(
        connector: &dyn Connector,
        endpoint: &Url,
        options: SocketOptions,
    ) -> Result<Self, ProtocolError> {
        let transport = connector.connect(endpoint).await?;
        tracing::debug!("Transport to {} established", endpoint);
        Ok(Self::spawn(transport, options))
    }

    /// Start a driver task over an already connected transport
    pub fn spawn(transport: Box<dyn Transport>, options: SocketOptions) -> Self {
        let shared = Arc::new(SocketShared::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run_driver(
            transport,
            Arc::clone(&shared),
            outbound_rx,
            options,
        ));

        Self {
            shared,
            outbound,
            driver: Some(driver),
        }
    }

    /// Create a channel for `topic`. A previous channel on the same topic
    /// stops receiving state updates.
    pub fn channel(&self, topic: impl Into<String>) -> Channel {
        let topic = topic.into();
        let channel_shared = Arc::new(ChannelShared::new(topic.clone()));
        self.shared
            .channels
            .insert(topic, Arc::clone(&channel_shared));
        Channel::new(channel_shared, Arc::clone(&self.shared), self.outbound.clone())
    }

    /// Whether the driver task is still running
    pub fn is_connected(&self) -> bool {
        self.driver
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Wait until the connection ends.
    ///
    /// Returns `Ok` after a requested disconnect and the failure otherwise.
    /// Subsequent calls return [`ProtocolError::Closed`].
    pub async fn closed(&mut self) -> Result<(), ProtocolError> {
        let Some(driver) = self.driver.take() else {
            return Err(ProtocolError::Closed);
        };
        match driver.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Socket driver task failed: {}", e);
                Err(ProtocolError::Closed)
            }
        }
    }

    /// Close the transport and wait for the driver to finish
    pub async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        let _ = self.outbound.send(Outbound::Close);
        self.closed().await
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            self.shared.teardown();
        }
    }
}

async fn run_driver(
    mut transport: Box<dyn Transport>,
    shared: Arc<SocketShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    options: SocketOptions,
) -> Result<(), ProtocolError> {
    let codec = MessageCodec::new();
    let period = options.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_heartbeat: Option<String> = None;

    let result = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let message = match outbound {
                    Some(Outbound::Frame(message)) => message,
                    Some(Outbound::Close) | None => {
                        tracing::debug!("Closing socket");
                        if let Err(e) = transport.close().await {
                            tracing::debug!("Error while closing transport: {}", e);
                        }
                        break Ok(());
                    }
                };

                let text = match codec.encode(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Dropping {} on {}: {}", message.event, message.topic, e);
                        continue;
                    }
                };
                tracing::trace!("-> {}", text);
                if let Err(e) = transport.send(text).await {
                    break Err(e.into());
                }
            }

            inbound = transport.recv() => {
                match inbound {
                    Some(Ok(text)) => {
                        tracing::trace!("<- {}", text);
                        match codec.decode(&text) {
                            Ok(message) => shared.route(message, &mut pending_heartbeat),
                            Err(e) => tracing::warn!("Ignoring malformed frame: {}", e),
                        }
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Err(TransportError::Closed.into()),
                }
            }

            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    tracing::warn!("Heartbeat not acknowledged, dropping connection");
                    let _ = transport.close().await;
                    break Err(ProtocolError::HeartbeatTimeout);
                }

                let msg_ref = shared.make_ref();
                let text = match codec.encode(&Message::heartbeat(msg_ref.clone())) {
                    Ok(text) => text,
                    Err(e) => break Err(e),
                };
                if let Err(e) = transport.send(text).await {
                    break Err(e.into());
                }
                pending_heartbeat = Some(msg_ref);
            }
        }
    };

    shared.teardown();
    if let Err(e) = &result {
        tracing::warn!("Socket closed: {}", e);
    }
    result
}
