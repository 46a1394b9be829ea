//! `ocisync state` — Query and print a container's current state.

use clap::Args;
use ocisync_common::config::OcisyncConfig;
use ocisync_common::types::ContainerId;
use ocisync_runtime::container::Container;

use crate::output;

/// Arguments for the `state` command.
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Container ID.
    pub id: String,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `state` command.
///
/// # Errors
///
/// Returns an error if the runtime query fails or its annotations
/// cannot be decoded.
pub async fn execute(args: StateArgs, config: &OcisyncConfig) -> anyhow::Result<()> {
    let collaborators = super::collaborators(config)?;
    let id = ContainerId::new(args.id);
    let mut container = Container::new(id.clone(), config.paths_for(&id), collaborators);
    container
        .refresh_state()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let report = container.report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", output::format_report(&report));
    }
    Ok(())
}
