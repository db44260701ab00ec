//! rf-core: Core abstractions and configuration for the ranching.farm agent
//!
//! This crate provides the configuration value, shared domain types, error
//! types and collaborator traits used by the agent.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, RfError, SnapshotError};
pub use traits::SnapshotProvider;
pub use types::{ClusterId, ClusterSnapshot, NodeInfo, SessionState};
