//! Cluster inventory and the `info` announcement

mod announce;
mod kubectl;

pub use announce::announce;
pub use kubectl::{parse_node_list, KubectlSnapshotProvider};
