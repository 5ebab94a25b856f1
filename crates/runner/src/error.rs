//! Runner errors.
//!
//! Only verification can fail in a way that is not already a
//! [`RunOutcome`](gantry_core::outcome::RunOutcome); the controller folds
//! these into `VerificationFailed` with exit code 1.

use std::path::PathBuf;

use gantry_core::error::{GantryError, ProcessError};

/// Verification could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The checker command could not be prepared or spawned.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Reading or writing fixtures failed.
    #[error("fixture io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fixture document is malformed.
    #[error("invalid fixture {path}: {reason}")]
    InvalidFixture { path: PathBuf, reason: String },

    /// The comparison task panicked or was cancelled.
    #[error("verification task failed: {0}")]
    Task(String),
}

impl VerifyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<VerifyError> for GantryError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Process(e) => GantryError::Process(e),
            other => GantryError::Verify(other.to_string()),
        }
    }
}
