//! CLI-specific error types and exit code mapping

use gantry_core::error::GantryError;
use gantry_core::outcome::EXIT_FAILURE;

/// Harness-level failure, before or around scenario runs.
///
/// Failures of a scenario itself are not errors; they are reported through
/// the run's outcome and exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Signal handlers could not be installed.
    #[error("signal handler error: {0}")]
    Signal(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from gantry-core.
    #[error("{0}")]
    Core(#[from] GantryError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// Every harness error exits 1. Only scenario outcomes produce 8 (skip)
    /// or 130 (interrupted), so wrappers can trust those two codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_)
            | Self::Command(_)
            | Self::Signal(_)
            | Self::JsonSerialize(_)
            | Self::Io(_)
            | Self::Core(_) => EXIT_FAILURE,
        }
    }
}
