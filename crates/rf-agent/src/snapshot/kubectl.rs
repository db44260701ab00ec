//! Node inventory read through `kubectl`

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use rf_core::config::AgentConfig;
use rf_core::{ClusterSnapshot, NodeInfo, SnapshotError, SnapshotProvider};
use serde::Deserialize;

const STATUS_READY: &str = "Ready";
const STATUS_NOT_READY: &str = "NotReady";
const STATUS_UNKNOWN: &str = "Unknown";

/// [`SnapshotProvider`] listing nodes with `kubectl get nodes -o json`
#[derive(Debug, Clone)]
pub struct KubectlSnapshotProvider {
    program: String,
    kubeconfig: Option<PathBuf>,
}

impl KubectlSnapshotProvider {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            program: "kubectl".to_string(),
            kubeconfig,
        }
    }

    /// Use the configured kubeconfig, or the resolved default when that
    /// file exists. Otherwise kubectl falls back to in-cluster credentials.
    pub fn from_config(config: &AgentConfig) -> Self {
        let kubeconfig = match &config.kubeconfig {
            Some(path) => Some(path.clone()),
            None => config.resolve_kubeconfig().filter(|path| path.exists()),
        };
        Self::new(kubeconfig)
    }

    /// Override the kubectl binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn kubeconfig(&self) -> Option<&PathBuf> {
        self.kubeconfig.as_ref()
    }
}

#[async_trait]
impl SnapshotProvider for KubectlSnapshotProvider {
    async fn snapshot(&self) -> Result<ClusterSnapshot, SnapshotError> {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(["get", "nodes", "-o", "json"]);
        if let Some(path) = &self.kubeconfig {
            tracing::debug!("Using kubeconfig {:?}", path);
            command.arg("--kubeconfig").arg(path);
        }

        let output = command
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SnapshotError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SnapshotError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_node_list(&output.stdout)
    }
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

#[derive(Deserialize)]
struct Node {
    metadata: Metadata,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Deserialize)]
struct Metadata {
    name: String,
}

#[derive(Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

#[derive(Deserialize)]
struct NodeCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl NodeStatus {
    fn summary(&self) -> String {
        if let Some(phase) = self.phase.as_deref().filter(|p| !p.is_empty()) {
            return phase.to_string();
        }
        match self.conditions.iter().find(|c| c.kind == STATUS_READY) {
            Some(ready) if ready.status == "True" => STATUS_READY.to_string(),
            Some(_) => STATUS_NOT_READY.to_string(),
            None => STATUS_UNKNOWN.to_string(),
        }
    }
}

/// Parse `kubectl get nodes -o json` output, keeping the listing order
pub fn parse_node_list(json: &[u8]) -> Result<ClusterSnapshot, SnapshotError> {
    let list: NodeList = serde_json::from_slice(json)?;
    let nodes = list
        .items
        .into_iter()
        .map(|node| NodeInfo::new(node.metadata.name, node.status.summary()))
        .collect();
    Ok(ClusterSnapshot::new(nodes))
}
