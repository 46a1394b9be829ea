//! Global configuration model for ocisync.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{OcisyncError, Result};
use crate::types::ContainerId;

/// Root configuration for ocisync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcisyncConfig {
    /// Base directory for bundles, sync sockets, and logs.
    pub data_dir: PathBuf,
    /// Low-level runtime invocation.
    pub runtime: RuntimeConfig,
    /// Grace period in seconds before a stopping container is killed.
    pub stop_timeout_secs: u64,
}

impl Default for OcisyncConfig {
    fn default() -> Self {
        Self {
            data_dir: constants::data_dir().clone(),
            runtime: RuntimeConfig::default(),
            stop_timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl OcisyncConfig {
    /// Loads a configuration file. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OcisyncError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that cannot be expressed in the type system.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime binary is blank.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.binary.trim().is_empty() {
            return Err(OcisyncError::Config {
                message: "runtime.binary cannot be empty".into(),
            });
        }
        Ok(())
    }

    /// Derives the filesystem locations for a container under this data dir.
    #[must_use]
    pub fn paths_for(&self, id: &ContainerId) -> ContainerPaths {
        ContainerPaths::derive(&self.data_dir, id)
    }
}

/// How the low-level OCI runtime is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime binary name or path.
    pub binary: String,
    /// Arguments placed before every subcommand (e.g. `oci`).
    pub base_args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: constants::DEFAULT_RUNTIME_BINARY.into(),
            base_args: constants::DEFAULT_RUNTIME_ARGS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Filesystem locations owned by a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPaths {
    /// OCI bundle directory.
    pub bundle: PathBuf,
    /// Socket the runtime reports state transitions to.
    pub sync_socket: PathBuf,
    /// Container process log file.
    pub log: PathBuf,
}

impl ContainerPaths {
    /// Lays out `bundles/<id>`, `sync/<id>.sock`, and `logs/<id>.log`
    /// under `data_dir`.
    #[must_use]
    pub fn derive(data_dir: &Path, id: &ContainerId) -> Self {
        Self {
            bundle: data_dir.join(constants::BUNDLES_DIR).join(id.as_str()),
            sync_socket: data_dir
                .join(constants::SYNC_DIR)
                .join(format!("{id}.sock")),
            log: data_dir.join(constants::LOGS_DIR).join(format!("{id}.log")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_derived_per_container() {
        let paths = ContainerPaths::derive(Path::new("/var/lib/ocisync"), &ContainerId::new("c1"));
        assert_eq!(paths.bundle, PathBuf::from("/var/lib/ocisync/bundles/c1"));
        assert_eq!(paths.sync_socket, PathBuf::from("/var/lib/ocisync/sync/c1.sock"));
        assert_eq!(paths.log, PathBuf::from("/var/lib/ocisync/logs/c1.log"));
    }

    #[test]
    fn default_runtime_uses_oci_subcommand() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.binary, "singularity");
        assert_eq!(runtime.base_args, vec!["oci"]);
    }

    #[test]
    fn load_fills_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir": "/srv/ocisync", "stop_timeout_secs": 3}"#)
            .expect("write");

        let config = OcisyncConfig::load(&path).expect("load");
        assert_eq!(config.data_dir, PathBuf::from("/srv/ocisync"));
        assert_eq!(config.stop_timeout_secs, 3);
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn load_rejects_blank_runtime_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"runtime": {"binary": " "}}"#).expect("write");

        let err = OcisyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, OcisyncError::Config { .. }));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = OcisyncConfig::load(Path::new("/nonexistent/ocisync.json")).unwrap_err();
        assert!(matches!(err, OcisyncError::Io { .. }));
    }
}
