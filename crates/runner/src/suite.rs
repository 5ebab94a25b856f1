//! Suite runner: many scenarios, bounded concurrency, one exit code.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use gantry_core::outcome::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS, RunOutcome, RunStage};
use gantry_core::process::ProcessRunner;
use gantry_core::scenario::Scenario;
use gantry_service::ServiceProvider;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::controller::RunController;
use crate::report::RunReport;

/// How a suite is run and judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteOptions {
    /// Scenarios run at the same time. At least 1.
    pub jobs: usize,
    /// Scenarios whose failure is reported but does not fail the suite.
    pub ignore_failures: BTreeSet<String>,
    /// Count skipped scenarios as failures.
    pub fail_on_skip: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            ignore_failures: BTreeSet::new(),
            fail_on_skip: false,
        }
    }
}

/// Aggregated result of a suite.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    /// One per scenario, in the order requested.
    pub reports: Vec<RunReport>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub interrupted: usize,
    /// Failures listed in `ignore_failures`.
    pub ignored: usize,
    pub exit_code: i32,
}

impl SuiteSummary {
    /// Tally `reports` under `options`.
    ///
    /// 130 when any run was interrupted, else 1 when a non-ignored scenario
    /// failed (or was skipped under `fail_on_skip`), else 0.
    pub fn from_reports(reports: Vec<RunReport>, options: &SuiteOptions) -> Self {
        let mut summary = Self {
            reports: Vec::new(),
            passed: 0,
            failed: 0,
            skipped: 0,
            interrupted: 0,
            ignored: 0,
            exit_code: EXIT_SUCCESS,
        };
        let mut failing = false;

        for report in &reports {
            let ignored = options.ignore_failures.contains(&report.scenario);
            match &report.outcome {
                RunOutcome::Passed => summary.passed += 1,
                RunOutcome::Skipped { .. } => {
                    summary.skipped += 1;
                    failing |= options.fail_on_skip && !ignored;
                }
                RunOutcome::Interrupted => summary.interrupted += 1,
                _ if ignored => {
                    summary.failed += 1;
                    summary.ignored += 1;
                }
                _ => {
                    summary.failed += 1;
                    failing = true;
                }
            }
        }

        summary.exit_code = if summary.interrupted > 0 {
            EXIT_INTERRUPTED
        } else if failing {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        };
        summary.reports = reports;
        summary
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }
}

/// Run `scenarios` with at most `options.jobs` in flight.
///
/// Scenarios share a workspace by name, so a repeated name runs once.
/// Cancelling `cancel` interrupts every in-flight run and marks queued ones
/// interrupted without starting them.
pub async fn run_suite<R: ProcessRunner, P: ServiceProvider>(
    controller: &RunController<R, P>,
    scenarios: Vec<Scenario>,
    options: &SuiteOptions,
    cancel: CancellationToken,
) -> SuiteSummary {
    let mut seen = BTreeSet::new();
    let scenarios: Vec<Scenario> = scenarios
        .into_iter()
        .filter(|s| {
            let first = seen.insert(s.name.clone());
            if !first {
                warn!(scenario = %s.name, "scenario listed more than once, running it once");
            }
            first
        })
        .collect();
    let permits = Arc::new(Semaphore::new(options.jobs.max(1)));
    info!(
        scenarios = scenarios.len(),
        jobs = options.jobs.max(1),
        "running suite"
    );

    let mut handles = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let controller = controller.clone();
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        let name = scenario.name.clone();
        let connector = scenario.connector.clone();
        let handle = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return not_started(&scenario, RunOutcome::Interrupted);
            };
            controller.run_with_cancel(&scenario, cancel).await
        });
        handles.push((name, connector, handle));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (name, connector, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(scenario = %name, error = %e, "scenario task failed");
                reports.push(not_started(
                    &Scenario::new(name, connector),
                    RunOutcome::ConfigurationError {
                        reason: format!("scenario task failed: {e}"),
                    },
                ));
            }
        }
    }

    let summary = SuiteSummary::from_reports(reports, options);
    info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        interrupted = summary.interrupted,
        exit_code = summary.exit_code,
        "suite finished"
    );
    summary
}

fn not_started(scenario: &Scenario, outcome: RunOutcome) -> RunReport {
    RunReport::new(
        Uuid::new_v4(),
        scenario.name.clone(),
        scenario.connector.clone(),
        outcome,
        vec![RunStage::Init, RunStage::Failed],
        Duration::ZERO,
        None,
    )
}
