//! Session orchestration
//!
//! One session is one transport connection carrying one joined channel.
//! After every successful join the cluster snapshot is announced and the
//! command subscription is served until the connection or the channel
//! goes away. Lost sessions are re-established with exponential backoff.

use std::sync::Arc;

use rf_core::config::AgentConfig;
use rf_core::{SessionState, SnapshotProvider};
use rf_protocol::{Channel, Connector, ProtocolError, Socket, SocketOptions};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::reconnect::ExponentialBackoff;
use super::SessionError;
use crate::ack::log_ack;
use crate::command::{DispatchOptions, Dispatcher, Executor};
use crate::snapshot::announce;
use crate::CMD_EVENT;

/// Join payload authenticating the agent
#[derive(Serialize)]
struct JoinPayload<'a> {
    secret: &'a str,
    version: &'a str,
}

/// How a single session ended
enum SessionEnd {
    /// Shutdown was requested
    Shutdown,
    /// The connection or channel was lost after joining
    Lost(String),
}

/// Drives the agent's connection to the control-plane
pub struct SessionOrchestrator {
    config: Arc<AgentConfig>,
    connector: Arc<dyn Connector>,
    snapshots: Arc<dyn SnapshotProvider>,
    dispatcher: Dispatcher,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
}

impl SessionOrchestrator {
    pub fn new(
        config: Arc<AgentConfig>,
        connector: Arc<dyn Connector>,
        snapshots: Arc<dyn SnapshotProvider>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let dispatcher = Dispatcher::new(executor, DispatchOptions::from_config(&config));
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            connector,
            snapshots,
            dispatcher,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Token that stops [`run`](Self::run) when cancelled. The channel is
    /// left and the connection closed before `run` returns.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run sessions until shutdown or an unrecoverable failure.
    ///
    /// Failing to connect or join the first time is fatal, as is a rejected
    /// join at any time. Later losses reconnect with backoff unless
    /// reconnecting is disabled.
    pub async fn run(&self) -> Result<(), SessionError> {
        let endpoint = self.config.endpoint_url()?;
        let mut backoff = ExponentialBackoff::from_config(&self.config.backoff);
        let mut established = false;

        loop {
            match self.run_once(&endpoint).await {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("Session shut down");
                    self.set_state(SessionState::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::Lost(reason)) => {
                    established = true;
                    backoff.reset();
                    tracing::warn!("Connection lost: {}", reason);
                    if !self.config.reconnect {
                        self.set_state(SessionState::Failed);
                        return Err(SessionError::ConnectionLost(reason));
                    }
                }
                Err(e @ SessionError::Join(ProtocolError::JoinRejected { .. })) => {
                    tracing::error!("{}", e);
                    self.set_state(SessionState::Failed);
                    return Err(e);
                }
                Err(e) if !established || !self.config.reconnect => {
                    tracing::error!("{}", e);
                    self.set_state(SessionState::Failed);
                    return Err(e);
                }
                Err(e) => tracing::warn!("Reconnect attempt failed: {}", e),
            }

            let Some(delay) = backoff.next_delay() else {
                self.set_state(SessionState::Failed);
                return Err(SessionError::ReconnectExhausted(backoff.attempts()));
            };
            self.set_state(SessionState::Reconnecting);
            tracing::info!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                backoff.attempts()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    self.set_state(SessionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    /// Connect, join and serve until the session ends
    async fn run_once(&self, endpoint: &Url) -> Result<SessionEnd, SessionError> {
        self.set_state(SessionState::Connecting);
        tracing::info!("Connecting to {}", endpoint);

        let options = SocketOptions {
            heartbeat_interval: self.config.heartbeat_interval,
        };
        let mut socket = tokio::select! {
            result = Socket::connect(self.connector.as_ref(), endpoint, options) => {
                result.map_err(SessionError::Connect)?
            }
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };
        self.set_state(SessionState::Connected);

        let channel = socket.channel(self.config.topic());
        // Subscribe before joining so no command sent right after the
        // join reply is missed
        let commands = channel.subscribe(CMD_EVENT);

        self.set_state(SessionState::Joining);
        tracing::info!("Joining {}", channel.topic());
        let join = JoinPayload {
            secret: &self.config.secret,
            version: env!("CARGO_PKG_VERSION"),
        };
        tokio::select! {
            result = channel.join_and_wait(&join, self.config.join_timeout) => {
                result.map_err(SessionError::Join)?;
            }
            _ = self.shutdown.cancelled() => {
                let _ = socket.disconnect().await;
                return Ok(SessionEnd::Shutdown);
            }
        }
        tracing::info!("Successfully joined {}", channel.topic());
        self.set_state(SessionState::Joined);

        let announcement = {
            let channel = channel.clone();
            let snapshots = Arc::clone(&self.snapshots);
            let push_timeout = self.config.push_timeout;
            tokio::spawn(async move {
                if let Err(e) = announce(&channel, snapshots.as_ref(), push_timeout).await {
                    tracing::error!("Error sending cluster info: {}", e);
                }
            })
        };

        self.set_state(SessionState::Serving);
        let shutdown = tokio::select! {
            _ = self.dispatcher.run(&channel, commands) => false,
            state = channel.closed() => {
                tracing::warn!("Channel {} is {}", channel.topic(), state);
                false
            }
            _ = self.shutdown.cancelled() => true,
        };
        announcement.abort();

        if shutdown {
            self.leave(&channel).await;
            if let Err(e) = socket.disconnect().await {
                tracing::debug!("Error while disconnecting: {}", e);
            }
            return Ok(SessionEnd::Shutdown);
        }

        let reason = match socket.disconnect().await {
            Err(e) => e.to_string(),
            Ok(()) => format!("channel {} is {}", channel.topic(), channel.state()),
        };
        Ok(SessionEnd::Lost(reason))
    }

    async fn leave(&self, channel: &Channel) {
        tracing::info!("Leaving {}", channel.topic());
        match channel.leave() {
            Ok(push) => log_ack(push, self.config.push_timeout, "Leave").await,
            Err(e) => tracing::debug!("Not leaving {}: {}", channel.topic(), e),
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Session state: {} -> {}", previous, state);
        }
    }
}
