//! Remote command execution

mod dispatcher;
mod executor;

pub use dispatcher::{CommandRequest, CommandResult, DecodeError, DispatchOptions, Dispatcher};
pub use executor::{split_arguments, ExecutionError, Executor, ProcessExecutor};
