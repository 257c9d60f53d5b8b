//! Error taxonomy for provisioning steps.
//!
//! Every variant is fatal. The sequencer never retries and never compensates;
//! it reports the error with the step that raised it and stops.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("must run with elevated privileges (effective uid is {euid}, need 0)")]
    Permission { euid: u32 },

    #[error("unsupported platform: expected {expected}, found {found}")]
    UnsupportedPlatform { expected: String, found: String },

    #[error("missing required host tools: {}", .tools.join(", "))]
    MissingTools { tools: Vec<String> },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network failure fetching '{url}': {message}")]
    Network { url: String, message: String },

    #[error("command `{command}` failed with {status}")]
    ExternalCommand { command: String, status: String },

    #[error("expected file is missing: {}", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("checksum mismatch for '{}': expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("archive '{}': {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    #[error("every step finished but the success record was not saved")]
    RecordNotSaved {
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attach a human-readable context to `io::Result`, mirroring `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| ProvisionError::io(f(), source))
    }
}
