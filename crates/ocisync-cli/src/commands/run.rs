//! `ocisync run` — Create a container and stop it on Ctrl+C.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use ocisync_common::config::OcisyncConfig;
use ocisync_common::types::{ContainerId, ImageInfo};
use ocisync_runtime::container::Container;

use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Unpacked root filesystem of the image.
    #[arg(long)]
    pub rootfs: PathBuf,

    /// Image reference recorded in the bundle (defaults to the rootfs path).
    #[arg(long)]
    pub image: Option<String>,

    /// Container ID (generated if omitted).
    #[arg(long)]
    pub id: Option<String>,

    /// Environment variables as KEY=VALUE.
    #[arg(short, long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Working directory inside the container.
    #[arg(long, default_value = "/")]
    pub cwd: String,

    /// Seconds to wait for a graceful exit before killing.
    #[arg(long)]
    pub stop_timeout: Option<u64>,

    /// Kill without a grace period on shutdown.
    #[arg(short, long)]
    pub force: bool,

    /// Command to run inside the container.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the container cannot be created or stopped.
pub async fn execute(args: RunArgs, config: &OcisyncConfig) -> anyhow::Result<()> {
    let collaborators = super::collaborators(config)?;
    let id = args
        .id
        .as_deref()
        .map_or_else(ContainerId::generate, ContainerId::new);
    let reference = args
        .image
        .clone()
        .unwrap_or_else(|| format!("file://{}", args.rootfs.display()));

    let mut image = ImageInfo::new(reference, &args.rootfs).with_command(args.command);
    image.env = args.env;
    image.working_dir = args.cwd;

    let mut container = Container::new(id.clone(), config.paths_for(&id), collaborators);
    container
        .spawn(&image)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    refresh(&mut container).await;
    eprintln!("{}", output::format_report(&container.report()));

    eprintln!("Press Ctrl+C to stop container {id}...");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for Ctrl+C: {e}"))?;

    let stopped = if args.force {
        container.kill().await
    } else {
        let timeout = args.stop_timeout.unwrap_or(config.stop_timeout_secs);
        container.terminate(Duration::from_secs(timeout)).await
    };
    stopped.map_err(|e| anyhow::anyhow!("{e}"))?;

    refresh(&mut container).await;
    eprintln!("{}", output::format_report(&container.report()));
    Ok(())
}

/// Refreshes cached state for display; a failed query only loses detail.
async fn refresh(container: &mut Container) {
    if let Err(e) = container.refresh_state().await {
        tracing::warn!(id = %container.id(), error = %e, "could not refresh container state");
    }
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}
