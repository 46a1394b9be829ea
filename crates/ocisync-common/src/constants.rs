//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for ocisync data on Linux with root access.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/ocisync";

/// Returns the data directory, preferring `$HOME/.ocisync` for non-root
/// environments, falling back to `/var/lib/ocisync`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let user_dir = PathBuf::from(home).join(".ocisync");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Subdirectory of the data dir holding per-container OCI bundles.
pub const BUNDLES_DIR: &str = "bundles";

/// Subdirectory of the data dir holding state synchronization sockets.
pub const SYNC_DIR: &str = "sync";

/// Subdirectory of the data dir holding container log files.
pub const LOGS_DIR: &str = "logs";

/// File name of the OCI runtime configuration inside a bundle.
pub const BUNDLE_CONFIG_FILE: &str = "config.json";

/// OCI runtime specification version written into bundle configs.
pub const OCI_VERSION: &str = "1.0.2";

/// Low-level runtime binary invoked when none is configured.
pub const DEFAULT_RUNTIME_BINARY: &str = "singularity";

/// Leading arguments placed before every runtime subcommand.
pub const DEFAULT_RUNTIME_ARGS: &[&str] = &["oci"];

/// Grace period granted to a container before it is forcibly killed.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Number of undelivered state notifications buffered per session.
pub const SYNC_CHANNEL_CAPACITY: usize = 16;

