//! Per-run reports.

use std::time::Duration;

use gantry_core::outcome::{RunOutcome, RunStage};
use gantry_core::scenario::ConnectorKind;
use serde::Serialize;
use uuid::Uuid;

use crate::cleanup::CleanupReport;

/// What happened during one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub connector: ConnectorKind,
    pub outcome: RunOutcome,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Stages in the order they were reached.
    pub stages: Vec<RunStage>,
    /// Absent when the run never got far enough to own directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        scenario: impl Into<String>,
        connector: ConnectorKind,
        outcome: RunOutcome,
        stages: Vec<RunStage>,
        duration: Duration,
        cleanup: Option<CleanupReport>,
    ) -> Self {
        let exit_code = outcome.exit_code();
        Self {
            run_id,
            scenario: scenario.into(),
            connector,
            outcome,
            exit_code,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            stages,
            cleanup,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn reached(&self, stage: RunStage) -> bool {
        self.stages.contains(&stage)
    }
}
