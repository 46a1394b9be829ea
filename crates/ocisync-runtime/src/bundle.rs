//! OCI bundle preparation.

use std::path::Path;

use ocisync_common::constants::{BUNDLE_CONFIG_FILE, OCI_VERSION};
use ocisync_common::error::{OcisyncError, Result};
use ocisync_common::types::{ContainerId, ImageInfo};

/// Annotation recording which image a bundle was built from.
pub const IMAGE_REFERENCE_ANNOTATION: &str = "io.ocisync.image.reference";

/// Lays out the bundle directory a runtime creates a container from.
pub trait BundleBuilder: Send + Sync {
    /// Builds the bundle for `id` at `bundle` from `image`.
    ///
    /// # Errors
    ///
    /// Returns [`OcisyncError::Bundle`] if the bundle cannot be prepared.
    fn build(&self, id: &ContainerId, image: &ImageInfo, bundle: &Path) -> Result<()>;
}

/// Writes a minimal OCI `config.json` pointing at the image's unpacked rootfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBundleBuilder;

impl BundleBuilder for FsBundleBuilder {
    fn build(&self, id: &ContainerId, image: &ImageInfo, bundle: &Path) -> Result<()> {
        let bundle_err = |message: String| OcisyncError::Bundle {
            id: id.to_string(),
            message,
        };

        if image.command.is_empty() {
            return Err(bundle_err(format!("image {} has no command", image.reference)));
        }
        if !image.rootfs.is_dir() {
            return Err(bundle_err(format!(
                "rootfs {} is not a directory",
                image.rootfs.display()
            )));
        }

        std::fs::create_dir_all(bundle)
            .map_err(|e| bundle_err(format!("{}: {e}", bundle.display())))?;

        let config = runtime_config(id, image);
        let path = bundle.join(BUNDLE_CONFIG_FILE);
        let content = serde_json::to_vec_pretty(&config)?;
        std::fs::write(&path, content).map_err(|e| bundle_err(format!("{}: {e}", path.display())))?;

        tracing::info!(
            id = %id,
            bundle = %bundle.display(),
            image = %image.reference,
            "oci bundle prepared"
        );
        Ok(())
    }
}

fn runtime_config(id: &ContainerId, image: &ImageInfo) -> serde_json::Value {
    let env: Vec<String> = image.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    serde_json::json!({
        "ociVersion": OCI_VERSION,
        "root": {
            "path": image.rootfs,
            "readonly": false,
        },
        "process": {
            "terminal": false,
            "user": { "uid": 0, "gid": 0 },
            "args": image.command,
            "env": env,
            "cwd": image.working_dir,
        },
        "hostname": id.as_str(),
        "annotations": {
            IMAGE_REFERENCE_ANNOTATION: image.reference,
        },
    })
}
