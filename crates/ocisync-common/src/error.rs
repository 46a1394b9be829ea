//! Unified error type for the ocisync workspace.
//!
//! Every lifecycle failure carries enough context to tell which phase
//! failed and which state was expected or observed.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Phase, RuntimeState};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum OcisyncError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The OCI bundle could not be prepared.
    #[error("could not create oci bundle for {id}: {message}")]
    Bundle {
        /// Container the bundle was built for.
        id: String,
        /// Description of the failure.
        message: String,
    },

    /// The state synchronization session could not be opened.
    #[error("could not listen for state changes on {path}: {message}")]
    Session {
        /// Socket path the listener was bound to.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The runtime reported a state other than the one the phase expected.
    #[error("unexpected container state during {phase}: expected {expected}, got {actual}")]
    UnexpectedState {
        /// Lifecycle phase that was waiting.
        phase: Phase,
        /// State the phase was waiting for.
        expected: RuntimeState,
        /// State actually received.
        actual: RuntimeState,
    },

    /// The synchronization session ended before the expected state arrived.
    #[error("state synchronization closed during {phase} while waiting for {expected}")]
    SessionClosed {
        /// Lifecycle phase that was waiting.
        phase: Phase,
        /// State the phase was waiting for.
        expected: RuntimeState,
    },

    /// A state annotation could not be decoded.
    #[error("could not parse {field} {value:?}: {reason}")]
    Decode {
        /// Human-readable name of the decoded field.
        field: &'static str,
        /// Raw annotation value.
        value: String,
        /// Parser failure description.
        reason: String,
    },

    /// A request to the low-level runtime failed.
    #[error("runtime {operation} request for {id} failed: {message}")]
    RuntimeRequest {
        /// Runtime operation (`create`, `kill`, `state`).
        operation: &'static str,
        /// Container the request addressed.
        id: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OcisyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_state_names_observed_state() {
        let err = OcisyncError::UnexpectedState {
            phase: Phase::Kill,
            expected: RuntimeState::Exited,
            actual: RuntimeState::Created,
        };
        assert_eq!(
            err.to_string(),
            "unexpected container state during kill: expected exited, got created"
        );
    }

    #[test]
    fn decode_error_quotes_raw_value() {
        let err = OcisyncError::Decode {
            field: "exit code",
            value: "abc".into(),
            reason: "invalid digit found in string".into(),
        };
        assert!(err.to_string().contains("\"abc\""));
    }
}
