//! rf-agent: ranching.farm cluster agent
//!
//! The agent keeps one outbound channel connection to the control-plane,
//! announces the cluster's nodes after every join and executes the
//! commands the control-plane dispatches, replying with their output.

pub mod ack;
pub mod command;
pub mod session;
pub mod snapshot;

pub use command::{
    CommandRequest, CommandResult, DecodeError, DispatchOptions, Dispatcher, ExecutionError,
    Executor, ProcessExecutor,
};
pub use session::{ExponentialBackoff, SessionError, SessionOrchestrator};
pub use snapshot::{announce, KubectlSnapshotProvider};

/// Inbound event carrying a command
pub const CMD_EVENT: &str = "cmd";
/// Outbound event carrying the cluster snapshot
pub const INFO_EVENT: &str = "info";
/// Outbound event carrying a command result
pub const OUTPUT_EVENT: &str = "output";
