//! Low-level OCI runtime client.
//!
//! [`RuntimeClient`] is the seam between the lifecycle controller and the
//! runtime binary. [`CliRuntimeClient`] drives a runtime that follows the
//! `create`/`kill`/`state` command-line conventions.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ocisync_common::config::RuntimeConfig;
use ocisync_common::error::{OcisyncError, Result};
use ocisync_common::types::ContainerId;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Container state as reported by the runtime's `state` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// OCI specification version the runtime implements.
    #[serde(default)]
    pub oci_version: String,
    /// Container identifier.
    pub id: String,
    /// Runtime-native status (`creating`, `created`, `running`, `stopped`).
    pub status: String,
    /// PID of the container process, zero if none.
    #[serde(default)]
    pub pid: i32,
    /// Bundle directory the container was created from.
    #[serde(default)]
    pub bundle: String,
    /// Lifecycle metadata, see [`crate::annotation`].
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Operations the lifecycle controller needs from the low-level runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Creates a container from `bundle`. The runtime reports progress to
    /// `sync_socket`; completion is not signaled through the return value.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be launched or rejects the request.
    async fn create(
        &self,
        id: &ContainerId,
        bundle: &Path,
        sync_socket: &Path,
        log: &Path,
    ) -> Result<()>;

    /// Asks the runtime to stop the container, forcibly when `force` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    async fn kill(&self, id: &ContainerId, force: bool) -> Result<()>;

    /// Queries the container's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or its output cannot be decoded.
    async fn state(&self, id: &ContainerId) -> Result<StateSnapshot>;
}

/// Runtime client that shells out to the runtime binary.
#[derive(Debug, Clone)]
pub struct CliRuntimeClient {
    binary: PathBuf,
    base_args: Vec<String>,
}

impl CliRuntimeClient {
    /// Creates a client for the configured runtime binary.
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            binary: PathBuf::from(&config.binary),
            base_args: config.base_args.clone(),
        }
    }

    /// Resolves the runtime binary against `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`OcisyncError::NotFound`] if the binary cannot be found.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.binary).map_err(|_| OcisyncError::NotFound {
            kind: "runtime binary",
            id: self.binary.display().to_string(),
        })
    }

    /// Runs one runtime subcommand and returns its stdout.
    async fn run(
        &self,
        operation: &'static str,
        id: &ContainerId,
        args: &[OsString],
    ) -> Result<Vec<u8>> {
        tracing::debug!(id = %id, operation, binary = %self.binary.display(), "invoking runtime");

        let output = Command::new(&self.binary)
            .args(&self.base_args)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcisyncError::RuntimeRequest {
                operation,
                id: id.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcisyncError::RuntimeRequest {
                operation,
                id: id.to_string(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl RuntimeClient for CliRuntimeClient {
    async fn create(
        &self,
        id: &ContainerId,
        bundle: &Path,
        sync_socket: &Path,
        log: &Path,
    ) -> Result<()> {
        let args = create_args(id, bundle, sync_socket, log);
        let _ = self.run("create", id, &args).await?;
        Ok(())
    }

    async fn kill(&self, id: &ContainerId, force: bool) -> Result<()> {
        let _ = self.run("kill", id, &kill_args(id, force)).await?;
        Ok(())
    }

    async fn state(&self, id: &ContainerId) -> Result<StateSnapshot> {
        let stdout = self.run("state", id, &[os("state"), os(id.as_str())]).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

fn os(s: impl AsRef<OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

fn create_args(id: &ContainerId, bundle: &Path, sync_socket: &Path, log: &Path) -> Vec<OsString> {
    vec![
        os("create"),
        os("--bundle"),
        os(bundle),
        os("--sync-socket"),
        os(sync_socket),
        os("--log-path"),
        os(log),
        os(id.as_str()),
    ]
}

fn kill_args(id: &ContainerId, force: bool) -> Vec<OsString> {
    let signal = if force { "SIGKILL" } else { "SIGTERM" };
    vec![os("kill"), os("--signal"), os(signal), os(id.as_str())]
}
