//! Agent configuration

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use super::backoff::BackoffConfig;
use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;
use crate::types::ClusterId;

/// Control-plane socket endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "wss://ranching.farm/socket/kubernetes/cluster";

/// Configuration for the cluster agent.
///
/// Built once at startup (file, then command-line overrides) and passed by
/// reference to the session, dispatcher and snapshot provider.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control-plane socket endpoint (ws:// or wss://)
    pub endpoint: String,

    /// Identifier of the cluster this agent serves
    pub cluster_id: String,

    /// Cluster secret sent with the channel join
    pub secret: String,

    /// Kubeconfig used by the snapshot provider
    pub kubeconfig: Option<PathBuf>,

    /// Interval between socket heartbeats
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How long to wait for the join reply
    #[serde(with = "duration_secs")]
    pub join_timeout: Duration,

    /// How long to wait for push acknowledgments before logging a timeout
    #[serde(with = "duration_secs")]
    pub push_timeout: Duration,

    /// Kill commands running longer than this (None = no limit)
    #[serde(with = "option_duration_secs")]
    pub command_timeout: Option<Duration>,

    /// Commands executed at once. 1 keeps strict arrival order.
    pub max_concurrent_commands: usize,

    /// Reply with an error `output` to malformed commands that carry a uuid
    pub reply_on_decode_error: bool,

    /// Reconnect after the connection is lost
    pub reconnect: bool,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cluster_id: String::new(),
            secret: String::new(),
            kubeconfig: None,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            push_timeout: Duration::from_secs(10),
            command_timeout: None,
            max_concurrent_commands: 1,
            reply_on_decode_error: false,
            reconnect: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Cluster identifier
    pub fn cluster(&self) -> ClusterId {
        ClusterId::new(self.cluster_id.clone())
    }

    /// Channel topic for this cluster (`cluster:<id>`)
    pub fn topic(&self) -> String {
        self.cluster().topic()
    }

    /// Parsed endpoint URL
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::Invalid(format!("endpoint {:?}: {}", self.endpoint, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "endpoint scheme must be ws or wss, got {}",
                other
            ))),
        }
    }

    /// Kubeconfig path: configured value, then `$KUBECONFIG`, then
    /// `~/.kube/config`.
    pub fn resolve_kubeconfig(&self) -> Option<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Some(path.clone());
        }
        match std::env::var_os("KUBECONFIG") {
            Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => dirs::home_dir().map(|home| home.join(".kube").join("config")),
        }
    }

    /// Check that the configuration can start a session
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_id.trim().is_empty() {
            return Err(ConfigError::MissingField("cluster_id".to_string()));
        }
        if self.secret.is_empty() {
            return Err(ConfigError::MissingField("secret".to_string()));
        }
        self.endpoint_url()?;
        if self.max_concurrent_commands == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_commands must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval must be at least 1 second".to_string(),
            ));
        }
        self.backoff.validate()?;
        Ok(())
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("endpoint", &self.endpoint)
            .field("cluster_id", &self.cluster_id)
            .field("secret", &"<redacted>")
            .field("kubeconfig", &self.kubeconfig)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("join_timeout", &self.join_timeout)
            .field("push_timeout", &self.push_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("max_concurrent_commands", &self.max_concurrent_commands)
            .field("reply_on_decode_error", &self.reply_on_decode_error)
            .field("reconnect", &self.reconnect)
            .field("backoff", &self.backoff)
            .finish()
    }
}
