//! Core error types

use std::path::PathBuf;

use rf_protocol::ProtocolError;
use thiserror::Error;

/// Top-level error type for the agent
#[derive(Error, Debug)]
pub enum RfError {
    /// Channel protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cluster snapshot error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failures of the cluster snapshot collaborator
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The inventory tool could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The inventory tool exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The inventory output could not be parsed
    #[error("Failed to parse node list: {0}")]
    Parse(#[from] serde_json::Error),
}
