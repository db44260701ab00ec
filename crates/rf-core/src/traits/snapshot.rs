//! Cluster inventory collaborator

use async_trait::async_trait;

use crate::error::SnapshotError;
use crate::types::ClusterSnapshot;

/// Source of the node listing announced after each join
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// List the current nodes, in the provider's order
    async fn snapshot(&self) -> Result<ClusterSnapshot, SnapshotError>;
}
