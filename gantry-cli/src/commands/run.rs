//! `gantry run` command handler

use std::io::Write;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gantry_core::error::GantryError;
use gantry_core::outcome::RunOutcome;
use gantry_runner::report::RunReport;
use gantry_runner::suite::{SuiteOptions, SuiteSummary, run_suite};

use crate::cli::{RunArgs, SuiteFlags};
use crate::context::HarnessContext;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `run` command and return the process exit code.
///
/// With one name the exit code is that scenario's own exit code. With
/// several, the suite exit code applies.
pub async fn execute(
    args: RunArgs,
    ctx: &HarnessContext,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<i32, CliError> {
    let catalog = ctx.catalog().await?;
    let scenarios: Vec<_> = catalog
        .select(args.names.as_slice())
        .map_err(GantryError::from)?
        .into_iter()
        .cloned()
        .collect();
    let controller = ctx.controller()?;

    if let [scenario] = scenarios.as_slice() {
        info!(scenario = %scenario.name, "running single scenario");
        let report = controller.run_with_cancel(scenario, cancel).await;
        writer.render(&report)?;
        return Ok(report.exit_code());
    }

    let options = suite_options(&args.suite);
    let summary = run_suite(&controller, scenarios, &options, cancel).await;
    writer.render(&summary)?;
    Ok(summary.exit_code)
}

/// Convert CLI flags into runner options.
pub fn suite_options(flags: &SuiteFlags) -> SuiteOptions {
    SuiteOptions {
        jobs: flags.jobs.max(1),
        ignore_failures: flags.ignore_failures.iter().cloned().collect(),
        fail_on_skip: flags.fail_on_skip,
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "{} {} ({}) in {} ms, exit {}",
            status_label(&self.outcome),
            self.scenario.bold(),
            self.connector,
            self.duration_ms,
            self.exit_code
        )?;
        match &self.outcome {
            RunOutcome::Passed | RunOutcome::Interrupted => {}
            RunOutcome::VerificationFailed { details, .. } if !details.is_empty() => {
                for detail in details {
                    writeln!(w, "    {}", detail)?;
                }
            }
            other => writeln!(w, "    {}", other)?,
        }
        if let Some(cleanup) = &self.cleanup {
            for dir in &cleanup.retained {
                writeln!(w, "    retained {}", dir.display())?;
            }
            for err in &cleanup.errors {
                writeln!(w, "    {} {}", "cleanup:".yellow(), err)?;
            }
        }
        Ok(())
    }
}

impl Render for SuiteSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for report in &self.reports {
            report.render_text(w)?;
        }
        writeln!(w)?;
        writeln!(
            w,
            "{} scenarios: {} passed, {} failed ({} ignored), {} skipped, {} interrupted",
            self.total(),
            self.passed.to_string().green(),
            self.failed.to_string().red(),
            self.ignored,
            self.skipped.to_string().yellow(),
            self.interrupted
        )?;
        writeln!(w, "exit code: {}", self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gantry_core::outcome::RunStage;
    use gantry_core::scenario::ConnectorKind;
    use gantry_runner::cleanup::CleanupReport;
    use uuid::Uuid;

    use super::*;

    fn report(name: &str, outcome: RunOutcome, cleanup: Option<CleanupReport>) -> RunReport {
        RunReport::new(
            Uuid::new_v4(),
            name,
            ConnectorKind::Local,
            outcome,
            vec![RunStage::Init],
            Duration::from_millis(42),
            cleanup,
        )
    }

    fn text_of<T: Render>(payload: &T) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        payload
            .render_text(&mut buffer)
            .expect("rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn suite_options_clamp_jobs() {
        let flags = SuiteFlags {
            jobs: 0,
            ignore_failures: vec!["flaky".to_owned()],
            fail_on_skip: true,
        };
        let options = suite_options(&flags);
        assert_eq!(options.jobs, 1);
        assert!(options.ignore_failures.contains("flaky"));
        assert!(options.fail_on_skip);
    }

    #[test]
    fn run_report_text_lists_verification_details() {
        let report = report(
            "local",
            RunOutcome::verification_failed(Some(1), vec!["content differs: a.json".to_owned()]),
            None,
        );
        let text = text_of(&report);
        assert!(text.contains("VERIFICATION_FAILED local"));
        assert!(text.contains("exit 1"));
        assert!(text.contains("content differs: a.json"));
    }

    #[test]
    fn run_report_text_shows_retained_downloads() {
        let cleanup = CleanupReport {
            retained: vec!["/tmp/local/download".into()],
            ..CleanupReport::default()
        };
        let text = text_of(&report("local", RunOutcome::Passed, Some(cleanup)));
        assert!(text.contains("PASSED local"));
        assert!(text.contains("retained /tmp/local/download"));
    }

    #[test]
    fn suite_summary_text_has_totals() {
        let reports = vec![
            report("a", RunOutcome::Passed, None),
            report(
                "b",
                RunOutcome::Skipped {
                    missing_env: vec!["TOKEN".to_owned()],
                },
                None,
            ),
        ];
        let summary = SuiteSummary::from_reports(reports, &SuiteOptions::default());
        let text = text_of(&summary);
        assert!(text.contains("skipped: missing TOKEN"));
        assert!(text.contains("2 scenarios: 1 passed, 0 failed (0 ignored), 1 skipped"));
        assert!(text.contains("exit code: 0"));
    }
}
