//! Acknowledgment logging for fire-and-forget pushes

use std::time::Duration;

use rf_protocol::{Push, ReplyStatus};

/// Wait for a push acknowledgment in the background and log the outcome
pub fn spawn_ack_logger(push: Push, timeout: Duration, what: &'static str) {
    tokio::spawn(async move {
        log_ack(push, timeout, what).await;
    });
}

/// Wait for a push acknowledgment and log the outcome
pub async fn log_ack(push: Push, timeout: Duration, what: &str) {
    let msg_ref = push.msg_ref().to_string();
    match push.receive_timeout(timeout).await {
        Ok(reply) => match reply.status {
            ReplyStatus::Ok => tracing::info!("{} sent successfully", what),
            status => tracing::warn!(
                "{} rejected by server (ref {}): {:?} {}",
                what,
                msg_ref,
                status,
                reply.response
            ),
        },
        Err(e) => tracing::warn!("No acknowledgment for {} (ref {}): {}", what, msg_ref, e),
    }
}
