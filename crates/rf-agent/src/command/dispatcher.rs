//! Command dispatch: inbound `cmd` events to outbound `output` replies

use std::sync::Arc;
use std::time::Duration;

use rf_core::config::AgentConfig;
use rf_protocol::{Channel, Subscription};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::executor::{split_arguments, Executor};
use crate::ack::spawn_ack_logger;
use crate::OUTPUT_EVENT;

/// Why an inbound command payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` must be a string")]
    InvalidField(&'static str),
}

/// A command dispatched by the control-plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Program to run
    pub command: String,
    /// Raw, whitespace-delimited argument string
    pub arguments: String,
    /// Correlation id echoed in the reply
    pub uuid: String,
}

impl CommandRequest {
    /// Decode a `cmd` payload `{"command", "arguments", "uuid"}`
    pub fn from_payload(payload: &Value) -> Result<Self, DecodeError> {
        let fields = payload.as_object().ok_or(DecodeError::NotAnObject)?;
        Ok(Self {
            command: string_field(fields, "command")?,
            arguments: string_field(fields, "arguments")?,
            uuid: string_field(fields, "uuid")?,
        })
    }

    /// Argument vector passed to the program
    pub fn argv(&self) -> Vec<String> {
        split_arguments(&self.arguments)
    }
}

fn string_field(fields: &Map<String, Value>, name: &'static str) -> Result<String, DecodeError> {
    match fields.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(DecodeError::InvalidField(name)),
        None => Err(DecodeError::MissingField(name)),
    }
}

/// Reply payload for one command, pushed as an `output` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub arguments: String,
    pub output: String,
    pub uuid: String,
}

impl CommandResult {
    pub fn new(request: &CommandRequest, output: String) -> Self {
        Self {
            command: request.command.clone(),
            arguments: request.arguments.clone(),
            output,
            uuid: request.uuid.clone(),
        }
    }
}

/// Dispatcher tuning, derived from [`AgentConfig`]
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Commands executed at once; 1 keeps strict arrival order
    pub max_concurrent_commands: usize,
    /// Reply to malformed payloads that still carry a string `uuid`
    pub reply_on_decode_error: bool,
    /// How long to wait for `output` acknowledgments
    pub push_timeout: Duration,
}

impl DispatchOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_concurrent_commands: config.max_concurrent_commands.max(1),
            reply_on_decode_error: config.reply_on_decode_error,
            push_timeout: config.push_timeout,
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Routes each inbound command to the executor and pushes one reply
pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, options: DispatchOptions) -> Self {
        Self { executor, options }
    }

    /// Serve `commands` until the subscription ends.
    ///
    /// With one worker, commands run strictly one at a time in arrival
    /// order and later commands wait in the subscription queue. With more,
    /// up to `max_concurrent_commands` run at once and replies are
    /// correlated only by `uuid`.
    pub async fn run(&self, channel: &Channel, mut commands: Subscription) {
        let limiter = Arc::new(Semaphore::new(self.options.max_concurrent_commands));
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                payload = commands.next() => {
                    let Some(payload) = payload else {
                        break;
                    };
                    tracing::info!("Received command payload: {}", payload);

                    let request = match CommandRequest::from_payload(&payload) {
                        Ok(request) => request,
                        Err(e) => {
                            self.reject(channel, &payload, e);
                            continue;
                        }
                    };

                    if self.options.max_concurrent_commands == 1 {
                        handle_command(self.executor.as_ref(), channel, request, self.options.push_timeout).await;
                        continue;
                    }

                    let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                        break;
                    };
                    let executor = Arc::clone(&self.executor);
                    let channel = channel.clone();
                    let push_timeout = self.options.push_timeout;
                    workers.spawn(async move {
                        handle_command(executor.as_ref(), &channel, request, push_timeout).await;
                        drop(permit);
                    });
                }

                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Command worker failed: {}", e);
                    }
                }
            }
        }

        if !workers.is_empty() {
            tracing::warn!("Abandoning {} running command(s)", workers.len());
            workers.shutdown().await;
        }
        tracing::debug!("Command subscription ended");
    }

    /// Handle a payload that failed to decode
    fn reject(&self, channel: &Channel, payload: &Value, error: DecodeError) {
        tracing::error!("Dropping malformed command: {}", error);
        if !self.options.reply_on_decode_error {
            return;
        }

        let Some(uuid) = payload.get("uuid").and_then(Value::as_str) else {
            return;
        };
        let text = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let result = CommandResult {
            command: text("command"),
            arguments: text("arguments"),
            output: format!("Error: invalid command payload: {}", error),
            uuid: uuid.to_string(),
        };
        send_result(channel, &result, self.options.push_timeout);
    }
}

/// Execute one command and push its result
async fn handle_command(
    executor: &dyn Executor,
    channel: &Channel,
    request: CommandRequest,
    push_timeout: Duration,
) {
    tracing::info!(
        uuid = %request.uuid,
        "Executing command: {} {}",
        request.command,
        request.arguments
    );

    let output = match executor.execute(&request.command, &request.argv()).await {
        Ok(stdout) => {
            tracing::info!(uuid = %request.uuid, "Command executed successfully");
            stdout
        }
        Err(e) => {
            tracing::error!(uuid = %request.uuid, "Error executing command: {}", e);
            e.report()
        }
    };

    send_result(channel, &CommandResult::new(&request, output), push_timeout);
}

fn send_result(channel: &Channel, result: &CommandResult, push_timeout: Duration) {
    match channel.push(OUTPUT_EVENT, result) {
        Ok(push) => spawn_ack_logger(push, push_timeout, "Command output"),
        Err(e) => tracing::error!(uuid = %result.uuid, "Failed to send command output: {}", e),
    }
}
