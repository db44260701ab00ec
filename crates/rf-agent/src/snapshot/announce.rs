use std::time::Duration;

use rf_core::{RfError, SnapshotProvider};
use rf_protocol::Channel;

use crate::ack::log_ack;
use crate::INFO_EVENT;

/// Push the current cluster snapshot as an `info` event and wait for its
/// acknowledgment.
///
/// A snapshot failure is returned before anything is pushed. A missing or
/// negative acknowledgment is only logged.
pub async fn announce(
    channel: &Channel,
    provider: &dyn SnapshotProvider,
    push_timeout: Duration,
) -> Result<(), RfError> {
    tracing::info!("Sending cluster info...");
    let snapshot = provider.snapshot().await?;
    tracing::info!("Found {} nodes", snapshot.nodes.len());

    let push = channel.push(INFO_EVENT, &snapshot)?;
    log_ack(push, push_timeout, "Cluster info").await;
    Ok(())
}
