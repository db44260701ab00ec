//! ranching.farm cluster agent
//!
//! Installed as a kubectl plugin (`kubectl ranching-farm connect ...`). The
//! agent joins the cluster's channel on the control-plane, announces the
//! cluster's nodes and runs the commands it is sent.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rf_agent::{KubectlSnapshotProvider, ProcessExecutor, SessionOrchestrator};
use rf_core::config::{self, AgentConfig};
use rf_protocol::WebSocketConnector;

#[derive(Parser)]
#[command(name = "kubectl-ranching_farm")]
#[command(version, about = "Connect a Kubernetes cluster to ranching.farm")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect this cluster to ranching.farm and serve commands
    Connect(ConnectArgs),

    /// Print the agent version
    Version,
}

#[derive(Args)]
struct ConnectArgs {
    /// Cluster identifier shown on ranching.farm
    #[arg(short = 'i', long, env = "RF_CLUSTER_ID")]
    cluster_id: Option<String>,

    /// Cluster secret
    #[arg(short, long, env = "RF_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Control-plane socket endpoint (ws:// or wss://)
    #[arg(short, long, env = "RF_ENDPOINT")]
    endpoint: Option<String>,

    /// Path to the kubeconfig used to list nodes
    #[arg(short, long)]
    kubeconfig: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Exit instead of reconnecting when the connection is lost
    #[arg(long)]
    no_reconnect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Connect(args)) => connect(args).await,
        Some(Commands::Version) => {
            println!("ranching.farm version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn connect(args: ConnectArgs) -> Result<()> {
    // Initialize logging
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(load_config(&args)?);
    tracing::info!("Connecting cluster {} to {}", config.cluster_id, config.endpoint);
    tracing::debug!("Configuration: {:?}", config);

    let snapshots = KubectlSnapshotProvider::from_config(&config);
    match snapshots.kubeconfig() {
        Some(path) => tracing::info!("Using kubeconfig {:?}", path),
        None => tracing::info!("No kubeconfig found, using in-cluster credentials"),
    }

    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&config),
        Arc::new(WebSocketConnector::new(config.connect_timeout)),
        Arc::new(snapshots),
        Arc::new(ProcessExecutor::new(config.command_timeout)),
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, disconnecting...");
            shutdown.cancel();
        }
    });

    orchestrator.run().await.context("Agent stopped")
}

/// Build the configuration: file first, then command-line overrides
fn load_config(args: &ConnectArgs) -> Result<AgentConfig> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else if args.config.is_some() {
        anyhow::bail!("Config file not found: {:?}", config_path);
    } else {
        AgentConfig::default()
    };

    if let Some(cluster_id) = &args.cluster_id {
        config.cluster_id = cluster_id.clone();
    }
    if let Some(secret) = &args.secret {
        config.secret = secret.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(kubeconfig) = &args.kubeconfig {
        config.kubeconfig = Some(kubeconfig.clone());
    }
    if args.no_reconnect {
        config.reconnect = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
