//! Run outcomes and the exit-code contract.
//!
//! | outcome | exit code |
//! |---------|-----------|
//! | passed | 0 |
//! | skipped (missing credentials) | 8 |
//! | configuration error, service startup failure | 1 |
//! | CLI failure, verification failure | child code (8 remapped to 1) |
//! | interrupted | 130 |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Success.
pub const EXIT_SUCCESS: i32 = 0;
/// Generic failure.
pub const EXIT_FAILURE: i32 = 1;
/// Scenario skipped because required credentials are absent.
pub const EXIT_SKIPPED: i32 = 8;
/// Run cancelled by SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Terminal result of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    Skipped {
        missing_env: Vec<String>,
    },
    ConfigurationError {
        reason: String,
    },
    ServiceStartupFailure {
        service: String,
        reason: String,
    },
    /// The CLI exited non-zero, or could not be started at all.
    CliFailed {
        exit_code: i32,
        reason: String,
    },
    VerificationFailed {
        exit_code: i32,
        details: Vec<String>,
    },
    Interrupted,
}

impl RunOutcome {
    /// CLI failure carrying the child's raw exit code, if any.
    pub fn cli_failed(code: Option<i32>, reason: impl Into<String>) -> Self {
        Self::CliFailed {
            exit_code: propagate(code),
            reason: reason.into(),
        }
    }

    /// Verification failure carrying the checker's raw exit code, if any.
    pub fn verification_failed(code: Option<i32>, details: Vec<String>) -> Self {
        Self::VerificationFailed {
            exit_code: propagate(code),
            details,
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => EXIT_SUCCESS,
            Self::Skipped { .. } => EXIT_SKIPPED,
            Self::ConfigurationError { .. } | Self::ServiceStartupFailure { .. } => EXIT_FAILURE,
            Self::CliFailed { exit_code, .. } | Self::VerificationFailed { exit_code, .. } => {
                *exit_code
            }
            Self::Interrupted => EXIT_INTERRUPTED,
        }
    }

    /// Whether the outcome counts as a failure. Skips are not failures.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Short label used in reports and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Skipped { .. } => "skipped",
            Self::ConfigurationError { .. } => "configuration_error",
            Self::ServiceStartupFailure { .. } => "service_startup_failure",
            Self::CliFailed { .. } => "cli_failed",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Skipped { missing_env } => {
                write!(f, "skipped: missing {}", missing_env.join(", "))
            }
            Self::ConfigurationError { reason } => write!(f, "configuration error: {reason}"),
            Self::ServiceStartupFailure { service, reason } => {
                write!(f, "service '{service}' failed to start: {reason}")
            }
            Self::CliFailed { exit_code, reason } => {
                write!(f, "cli failed (exit {exit_code}): {reason}")
            }
            Self::VerificationFailed { exit_code, details } => {
                write!(f, "verification failed (exit {exit_code})")?;
                if !details.is_empty() {
                    write!(f, ": {}", details.join("; "))?;
                }
                Ok(())
            }
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Map a child exit code onto a failing run exit code.
///
/// Killed-by-signal children have no code and report 1. Codes outside 1..=255
/// and the skip sentinel also become 1.
pub fn propagate(code: Option<i32>) -> i32 {
    match code {
        Some(c) if (1..=255).contains(&c) && c != EXIT_SKIPPED => c,
        _ => EXIT_FAILURE,
    }
}

/// Lifecycle stage of a run, recorded in order of occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Init,
    PathsResolved,
    Skipped,
    ServiceReady,
    CliExecuted,
    Verified,
    Failed,
    Cleaned,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::PathsResolved => "paths_resolved",
            Self::Skipped => "skipped",
            Self::ServiceReady => "service_ready",
            Self::CliExecuted => "cli_executed",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Cleaned => "cleaned",
        };
        f.write_str(s)
    }
}
