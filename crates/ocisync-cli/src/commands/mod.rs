//! CLI command definitions and dispatch.

pub mod run;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ocisync_common::config::OcisyncConfig;
use ocisync_runtime::bundle::FsBundleBuilder;
use ocisync_runtime::client::CliRuntimeClient;
use ocisync_runtime::container::Collaborators;
use ocisync_runtime::sync::SocketObserver;

/// ocisync — single-container lifecycle over an OCI runtime.
#[derive(Parser, Debug)]
#[command(name = "ocisync", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = "OCISYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for bundles, sync sockets, and logs.
    #[arg(long, global = true, env = "OCISYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Low-level runtime binary.
    #[arg(long, global = true, env = "OCISYNC_RUNTIME")]
    pub runtime: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a container, wait for Ctrl+C, then stop it.
    Run(run::RunArgs),
    /// Query and print a container's current state.
    State(state::StateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Run(args) => run::execute(args, &config).await,
        Command::State(args) => state::execute(args, &config).await,
    }
}

/// Loads the config file if given and applies command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<OcisyncConfig> {
    let mut config = match &cli.config {
        Some(path) => OcisyncConfig::load(path).map_err(|e| anyhow::anyhow!("{e}"))?,
        None => OcisyncConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir.clone_from(dir);
    }
    if let Some(runtime) = &cli.runtime {
        config.runtime.binary.clone_from(runtime);
    }
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}

/// Wires the runtime binary, socket observer, and bundle builder together.
///
/// # Errors
///
/// Returns an error if the runtime binary cannot be found.
fn collaborators(config: &OcisyncConfig) -> anyhow::Result<Collaborators> {
    let client = CliRuntimeClient::new(&config.runtime);
    let binary = client.locate().map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::debug!(binary = %binary.display(), "runtime located");

    Ok(Collaborators::new(
        Arc::new(client),
        Arc::new(SocketObserver::new()),
        Arc::new(FsBundleBuilder),
    ))
}
