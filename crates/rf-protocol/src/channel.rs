//! Topic-scoped channels over a socket

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::ProtocolError;
use crate::message::{events, Message, Reply};
use crate::socket::{Outbound, PendingReply, SocketShared};

/// Channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not joined (initial state, or after leave / server close)
    Closed,
    /// Join sent, waiting for the reply
    Joining,
    /// Join acknowledged; pushes and subscriptions are valid
    Joined,
    /// Join rejected, server-side crash or connection lost
    Errored,
    /// Leave sent, waiting for the reply
    Leaving,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Closed => write!(f, "closed"),
            ChannelState::Joining => write!(f, "joining"),
            ChannelState::Joined => write!(f, "joined"),
            ChannelState::Errored => write!(f, "errored"),
            ChannelState::Leaving => write!(f, "leaving"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelStatus {
    state: ChannelState,
    join_ref: Option<String>,
}

/// Channel state shared with the socket driver
pub(crate) struct ChannelShared {
    topic: String,
    status: watch::Sender<ChannelStatus>,
}

impl ChannelShared {
    pub(crate) fn new(topic: String) -> Self {
        let (status, _) = watch::channel(ChannelStatus {
            state: ChannelState::Closed,
            join_ref: None,
        });
        Self { topic, status }
    }

    fn state(&self) -> ChannelState {
        self.status.borrow().state
    }

    fn join_ref(&self) -> Option<String> {
        self.status.borrow().join_ref.clone()
    }

    pub(crate) fn on_join_reply(&self, join_ref: Option<&str>, reply: &Reply) {
        self.status.send_if_modified(|status| {
            if status.state != ChannelState::Joining || status.join_ref.as_deref() != join_ref {
                return false;
            }
            status.state = if reply.is_ok() {
                tracing::debug!("Joined {}", self.topic);
                ChannelState::Joined
            } else {
                tracing::debug!("Join of {} rejected: {}", self.topic, reply.response);
                ChannelState::Errored
            };
            true
        });
    }

    /// Apply a server-initiated transition, ignoring frames for stale joins
    pub(crate) fn transition(&self, join_ref: Option<&str>, state: ChannelState) {
        self.status.send_if_modified(|status| {
            if join_ref.is_some() && status.join_ref.as_deref() != join_ref {
                return false;
            }
            status.state = state;
            true
        });
    }

    pub(crate) fn on_disconnect(&self) {
        self.status.send_if_modified(|status| {
            if status.state == ChannelState::Closed {
                return false;
            }
            status.state = ChannelState::Errored;
            true
        });
    }
}

/// A topic-scoped channel multiplexed over a [`Socket`](crate::Socket)
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
    socket: Arc<SocketShared>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Channel {
    pub(crate) fn new(
        shared: Arc<ChannelShared>,
        socket: Arc<SocketShared>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            shared,
            socket,
            outbound,
        }
    }

    /// Channel topic
    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Send a join request. The returned push resolves with the server's
    /// reply; an `ok` reply moves the channel to [`ChannelState::Joined`].
    pub fn join<T: Serialize>(&self, payload: &T) -> Result<Push, ProtocolError> {
        if matches!(
            self.state(),
            ChannelState::Joining | ChannelState::Joined
        ) {
            return Err(ProtocolError::AlreadyJoined {
                topic: self.topic().to_string(),
            });
        }

        let payload = serde_json::to_value(payload).map_err(ProtocolError::Encoding)?;
        let join_ref = self.socket.make_ref();
        self.shared.status.send_replace(ChannelStatus {
            state: ChannelState::Joining,
            join_ref: Some(join_ref.clone()),
        });

        tracing::debug!("Joining {}", self.topic());
        let push = self.send(events::JOIN, Some(join_ref.clone()), join_ref, payload);
        if push.is_err() {
            self.shared.on_disconnect();
        }
        push
    }

    /// Join and wait for the reply.
    ///
    /// Fails with [`ProtocolError::JoinRejected`] on a non-ok status.
    pub async fn join_and_wait<T: Serialize>(
        &self,
        payload: &T,
        timeout: Duration,
    ) -> Result<Value, ProtocolError> {
        let reply = self.join(payload)?.receive_timeout(timeout).await?;
        if reply.is_ok() {
            Ok(reply.response)
        } else {
            Err(ProtocolError::JoinRejected {
                topic: self.topic().to_string(),
                response: reply.response,
            })
        }
    }

    /// Push an event on a joined channel.
    ///
    /// Fails synchronously if the payload cannot be serialized or the
    /// channel has not completed its join. Acknowledgments of separate
    /// pushes may arrive in any order.
    pub fn push<T: Serialize>(&self, event: &str, payload: &T) -> Result<Push, ProtocolError> {
        if self.state() != ChannelState::Joined {
            return Err(ProtocolError::NotJoined {
                topic: self.topic().to_string(),
            });
        }

        let payload = serde_json::to_value(payload).map_err(ProtocolError::Encoding)?;
        let msg_ref = self.socket.make_ref();
        self.send(event, self.shared.join_ref(), msg_ref, payload)
    }

    /// Subscribe to an inbound event. Payloads are yielded in arrival
    /// order. Subscribing again to the same event replaces this
    /// subscription, ending its stream.
    pub fn subscribe(&self, event: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = (self.topic().to_string(), event.to_string());
        if self.socket.subscriptions.insert(key, tx).is_some() {
            tracing::debug!("Replaced subscriber for {} on {}", event, self.topic());
        }
        Subscription { rx }
    }

    /// Leave the channel
    pub fn leave(&self) -> Result<Push, ProtocolError> {
        let join_ref = match self.state() {
            ChannelState::Joined | ChannelState::Joining => self.shared.join_ref(),
            _ => {
                return Err(ProtocolError::NotJoined {
                    topic: self.topic().to_string(),
                })
            }
        };

        self.shared.status.send_modify(|status| status.state = ChannelState::Leaving);
        let msg_ref = self.socket.make_ref();
        self.send(
            events::LEAVE,
            join_ref,
            msg_ref,
            Value::Object(Default::default()),
        )
    }

    /// Wait until the channel is no longer usable and return the state it
    /// settled in ([`ChannelState::Errored`] or [`ChannelState::Closed`]).
    pub async fn closed(&self) -> ChannelState {
        let mut status = self.shared.status.subscribe();
        loop {
            let state = status.borrow_and_update().state;
            if matches!(state, ChannelState::Errored | ChannelState::Closed) {
                return state;
            }
            if status.changed().await.is_err() {
                return ChannelState::Closed;
            }
        }
    }

    fn send(
        &self,
        event: &str,
        join_ref: Option<String>,
        msg_ref: String,
        payload: Value,
    ) -> Result<Push, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.socket.pending.insert(
            msg_ref.clone(),
            PendingReply {
                event: event.to_string(),
                tx,
            },
        );

        let message = Message::new(
            join_ref,
            Some(msg_ref.clone()),
            self.topic(),
            event,
            payload,
        );
        if self.outbound.send(Outbound::Frame(message)).is_err() {
            self.socket.pending.remove(&msg_ref);
            return Err(ProtocolError::Closed);
        }

        Ok(Push {
            event: event.to_string(),
            msg_ref,
            reply: rx,
            socket: Arc::clone(&self.socket),
        })
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.topic())
            .field("state", &self.state())
            .finish()
    }
}

/// An outbound message awaiting its acknowledgment
pub struct Push {
    event: String,
    msg_ref: String,
    reply: oneshot::Receiver<Reply>,
    socket: Arc<SocketShared>,
}

impl Push {
    /// Ref correlating this push with its reply
    pub fn msg_ref(&self) -> &str {
        &self.msg_ref
    }

    /// Wait for the acknowledgment
    pub async fn receive(self) -> Result<Reply, ProtocolError> {
        self.reply.await.map_err(|_| ProtocolError::Closed)
    }

    /// Wait for the acknowledgment for at most `timeout`
    pub async fn receive_timeout(self, timeout: Duration) -> Result<Reply, ProtocolError> {
        let Push {
            event,
            msg_ref,
            reply,
            socket,
        } = self;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => {
                socket.pending.remove(&msg_ref);
                Err(ProtocolError::ReplyTimeout { event })
            }
        }
    }
}

impl fmt::Debug for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("event", &self.event)
            .field("msg_ref", &self.msg_ref)
            .finish()
    }
}

/// Stream of inbound payloads for one event on one channel
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Next payload, or `None` once the subscription was replaced or the
    /// connection ended
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{Socket, SocketOptions};
    use crate::transport::{MemoryTransport, Transport};
    use serde_json::json;
    use std::collections::HashMap;

    fn connected() -> (Socket, MemoryTransport) {
        let (client, server) = MemoryTransport::pair();
        let socket = Socket::spawn(Box::new(client), SocketOptions::default());
        (socket, server)
    }

    async fn next_frame(server: &mut MemoryTransport) -> Message {
        let text = server.recv().await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    async fn reply(server: &mut MemoryTransport, to: &Message, status: &str, response: Value) {
        let frame = json!([
            to.join_ref,
            to.msg_ref,
            to.topic,
            "phx_reply",
            {"status": status, "response": response}
        ]);
        server.send(frame.to_string()).await.unwrap();
    }

    async fn joined(socket: &Socket, server: &mut MemoryTransport, topic: &str) -> Channel {
        let channel = socket.channel(topic);
        let push = channel.join(&json!({})).unwrap();
        let join = next_frame(server).await;
        reply(server, &join, "ok", json!({})).await;
        assert!(push.receive().await.unwrap().is_ok());
        channel
    }

    #[tokio::test]
    async fn test_join_ok_moves_to_joined() {
        let (socket, mut server) = connected();
        let channel = socket.channel("cluster:abc");
        assert_eq!(channel.state(), ChannelState::Closed);

        let push = channel.join(&json!({"secret": "s3cret"})).unwrap();
        assert_eq!(channel.state(), ChannelState::Joining);

        let join = next_frame(&mut server).await;
        assert_eq!(join.event, "phx_join");
        assert_eq!(join.topic, "cluster:abc");
        assert_eq!(join.join_ref, join.msg_ref);
        assert_eq!(join.payload["secret"], "s3cret");

        reply(&mut server, &join, "ok", json!({})).await;
        let ack = push.receive().await.unwrap();
        assert!(ack.is_ok());
        assert_eq!(channel.state(), ChannelState::Joined);
    }

    #[tokio::test]
    async fn test_join_error_leaves_channel_unjoined() {
        let (socket, mut server) = connected();
        let channel = socket.channel("cluster:abc");

        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .join_and_wait(&json!({}), Duration::from_secs(5))
                    .await
            })
        };
        let join = next_frame(&mut server).await;
        reply(&mut server, &join, "error", json!({"reason": "unauthorized"})).await;

        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(ProtocolError::JoinRejected { ref response, .. }) if response["reason"] == "unauthorized"
        ));
        assert_eq!(channel.state(), ChannelState::Errored);
        assert!(matches!(
            channel.push("info", &json!({})),
            Err(ProtocolError::NotJoined { .. })
        ));
    }

    #[tokio::test]
    async fn test_push_before_join_fails() {
        let (socket, _server) = connected();
        let channel = socket.channel("cluster:abc");
        let err = channel.push("info", &json!({})).unwrap_err();
        assert!(matches!(err, ProtocolError::NotJoined { topic } if topic == "cluster:abc"));
    }

    #[tokio::test]
    async fn test_push_unencodable_payload_fails() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;

        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON");
        let err = channel.push("info", &bad).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_acks_correlate_out_of_order() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;

        let first = channel.push("output", &json!({"uuid": "a"})).unwrap();
        let second = channel.push("output", &json!({"uuid": "b"})).unwrap();
        let first_frame = next_frame(&mut server).await;
        let second_frame = next_frame(&mut server).await;
        assert_eq!(first_frame.join_ref, second_frame.join_ref);

        reply(&mut server, &second_frame, "ok", json!({"n": 2})).await;
        reply(&mut server, &first_frame, "error", json!({"n": 1})).await;

        let second_ack = second.receive().await.unwrap();
        let first_ack = first.receive().await.unwrap();
        assert_eq!(second_ack.response["n"], 2);
        assert_eq!(first_ack.response["n"], 1);
        assert!(!first_ack.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_receives_in_order_and_can_be_replaced() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;
        let mut first = channel.subscribe("cmd");

        for n in 0..3 {
            let frame = json!([null, null, "cluster:abc", "cmd", {"n": n}]);
            server.send(frame.to_string()).await.unwrap();
        }
        for n in 0..3 {
            assert_eq!(first.next().await.unwrap()["n"], n);
        }

        let mut second = channel.subscribe("cmd");
        assert!(first.next().await.is_none());
        let frame = json!([null, null, "cluster:abc", "cmd", {"n": 9}]);
        server.send(frame.to_string()).await.unwrap();
        assert_eq!(second.next().await.unwrap()["n"], 9);
    }

    #[tokio::test]
    async fn test_events_for_other_topics_are_not_delivered() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;
        let mut sub = channel.subscribe("cmd");

        let other = json!([null, null, "cluster:other", "cmd", {"n": 1}]);
        let ours = json!([null, null, "cluster:abc", "cmd", {"n": 2}]);
        server.send(other.to_string()).await.unwrap();
        server.send(ours.to_string()).await.unwrap();
        assert_eq!(sub.next().await.unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn test_server_close_and_disconnect_end_channel() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;
        let join_ref = channel.shared.join_ref();

        let close = json!([join_ref, null, "cluster:abc", "phx_close", {}]);
        server.send(close.to_string()).await.unwrap();
        assert_eq!(channel.closed().await, ChannelState::Closed);

        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;
        let mut sub = channel.subscribe("cmd");
        server.close().await.unwrap();
        assert_eq!(channel.closed().await, ChannelState::Errored);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_leave_closes_on_reply() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;

        let push = channel.leave().unwrap();
        assert_eq!(channel.state(), ChannelState::Leaving);
        let leave = next_frame(&mut server).await;
        assert_eq!(leave.event, "phx_leave");
        reply(&mut server, &leave, "ok", json!({})).await;
        push.receive().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_timeout() {
        let (socket, mut server) = connected();
        let channel = joined(&socket, &mut server, "cluster:abc").await;

        let push = channel.push("info", &json!({})).unwrap();
        let err = push
            .receive_timeout(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ReplyTimeout { event } if event == "info"));
    }
}
