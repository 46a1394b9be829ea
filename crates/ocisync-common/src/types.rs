//! Domain primitive types used across the ocisync workspace.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container as reported by the low-level runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    /// No state has been observed yet.
    #[default]
    Unknown,
    /// The runtime is preparing the container.
    Creating,
    /// The container exists but its process has not been started.
    Created,
    /// The container process is running.
    Running,
    /// The container process has exited. Terminal.
    Exited,
}

impl RuntimeState {
    /// Maps a runtime-native OCI status string onto a lifecycle state.
    ///
    /// OCI runtimes report a finished container as `stopped`; anything
    /// unrecognized maps to [`RuntimeState::Unknown`].
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "creating" => Self::Creating,
            "created" => Self::Created,
            "running" => Self::Running,
            "stopped" | "exited" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Position of this state in the `Creating -> Created -> Running -> Exited`
    /// progression. `Unknown` sorts first.
    #[must_use]
    pub const fn lifecycle_rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Creating => 1,
            Self::Created => 2,
            Self::Running => 3,
            Self::Exited => 4,
        }
    }

    /// Returns whether no further transitions can follow this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Controller operation that was waiting on the runtime when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Container creation.
    Spawn,
    /// Graceful termination with escalation.
    Terminate,
    /// Forceful termination.
    Kill,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn => write!(f, "spawn"),
            Self::Terminate => write!(f, "terminate"),
            Self::Kill => write!(f, "kill"),
        }
    }
}

/// Image metadata needed to lay out an OCI bundle.
///
/// Pulling and unpacking happen elsewhere; by the time a container is
/// spawned the image is an unpacked root filesystem plus its process
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Image reference the rootfs was unpacked from.
    pub reference: String,
    /// Unpacked root filesystem.
    pub rootfs: PathBuf,
    /// Process arguments, entrypoint first.
    pub command: Vec<String>,
    /// Environment variables passed to the process.
    pub env: Vec<(String, String)>,
    /// Working directory of the process inside the container.
    pub working_dir: String,
}

impl ImageInfo {
    /// Creates image info for an unpacked rootfs with no process defaults.
    #[must_use]
    pub fn new(reference: impl Into<String>, rootfs: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            rootfs: rootfs.into(),
            command: Vec::new(),
            env: Vec::new(),
            working_dir: "/".into(),
        }
    }

    /// Sets the process arguments.
    #[must_use]
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}
