//! State annotation keys and their decoding.
//!
//! The runtime attaches lifecycle metadata to its state snapshots as
//! string annotations. Integer annotations are base-10; an absent or
//! empty value means "not reached yet" and decodes to zero.

use std::collections::HashMap;
use std::num::ParseIntError;

use ocisync_common::error::{OcisyncError, Result};

/// Creation timestamp, in nanoseconds since the Unix epoch.
pub const CREATED_AT: &str = "io.sylabs.runtime.oci.created_at";
/// Process start timestamp, in nanoseconds since the Unix epoch.
pub const STARTED_AT: &str = "io.sylabs.runtime.oci.started_at";
/// Process exit timestamp, in nanoseconds since the Unix epoch.
pub const FINISHED_AT: &str = "io.sylabs.runtime.oci.finished_at";
/// Exit code of the container process.
pub const EXIT_CODE: &str = "io.sylabs.runtime.oci.exit-code";
/// Human-readable exit reason.
pub const EXIT_DESC: &str = "io.sylabs.runtime.oci.exit-desc";
/// Socket for attaching to the container's stdio.
pub const ATTACH_SOCKET: &str = "io.sylabs.runtime.oci.attach-socket";
/// Socket for runtime control requests (e.g. terminal resize).
pub const CONTROL_SOCKET: &str = "io.sylabs.runtime.oci.control-socket";

/// Parses an integer annotation value.
///
/// # Errors
///
/// Returns the parser error if a non-empty value is not a base-10 `i64`.
pub fn parse_int_annotation(value: &str) -> std::result::Result<i64, ParseIntError> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse()
}

/// Returns an annotation value, or the empty string if absent.
#[must_use]
pub fn lookup<'a>(annotations: &'a HashMap<String, String>, key: &str) -> &'a str {
    annotations.get(key).map_or("", String::as_str)
}

/// Looks up and decodes an integer annotation, naming `field` on failure.
///
/// # Errors
///
/// Returns [`OcisyncError::Decode`] if the value is present but malformed.
pub fn decode_int(
    annotations: &HashMap<String, String>,
    key: &str,
    field: &'static str,
) -> Result<i64> {
    let value = lookup(annotations, key);
    parse_int_annotation(value).map_err(|e| OcisyncError::Decode {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
