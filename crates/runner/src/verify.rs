//! Post-run verification.
//!
//! | `verify.kind`  | check |
//! |----------------|-------|
//! | `diff-checker` | `<verify.diff_checker...> --output-folder-name <name>` |
//! | `fixtures`     | [`FixtureCheck`] against `<expected_root>/<name>` |
//! | `command`      | the scenario's own checker command |
//! | `none`         | nothing |
//!
//! Checker commands see `OUTPUT_ROOT` and are rendered like CLI arguments.

use std::path::Path;

use gantry_core::config::VerifyConfig;
use gantry_core::process::{CommandSpec, ProcessRunner};
use gantry_core::scenario::{Scenario, VerifySpec};
use gantry_core::template::Substitutions;
use gantry_core::workspace::Workspace;
use tracing::{debug, info};

use crate::error::VerifyError;
use crate::fixtures::FixtureCheck;

/// Result of a verification step that could be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// `exit_code` is the checker's raw code; `None` for native checks.
    Failed {
        exit_code: Option<i32>,
        details: Vec<String>,
    },
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Everything a verification step reads.
pub struct VerifyContext<'a> {
    pub scenario: &'a Scenario,
    pub workspace: &'a Workspace,
    pub config: &'a VerifyConfig,
    pub expected_root: &'a Path,
    pub subs: &'a Substitutions<'a>,
}

/// Run the scenario's verification step.
pub async fn verify<R: ProcessRunner>(
    runner: &R,
    ctx: &VerifyContext<'_>,
) -> Result<Verdict, VerifyError> {
    let scenario = ctx.scenario;
    debug!(kind = scenario.verify.label(), "verifying");

    match &scenario.verify {
        VerifySpec::Disabled => Ok(Verdict::Passed),
        VerifySpec::DiffChecker => {
            let command = checker_command(&ctx.config.diff_checker, ctx)?
                .arg("--output-folder-name")
                .arg(scenario.name.clone());
            run_checker(runner, &command).await
        }
        VerifySpec::Command { command } => {
            let command = checker_command(command, ctx)?;
            run_checker(runner, &command).await
        }
        VerifySpec::Fixtures {
            expected_num_files,
            exclude_fields,
        } => {
            let exclude_fields = ctx
                .config
                .exclude_fields
                .iter()
                .chain(exclude_fields)
                .cloned()
                .collect();
            let report = FixtureCheck {
                output_dir: ctx.workspace.output_dir.clone(),
                expected_dir: ctx.expected_root.join(&scenario.name),
                download_dir: ctx.workspace.download_dir.clone(),
                expected_num_files: *expected_num_files,
                exclude_fields,
                overwrite: ctx.config.overwrite_fixtures,
            }
            .run()
            .await?;
            if report.is_match() {
                Ok(Verdict::Passed)
            } else {
                Ok(Verdict::Failed {
                    exit_code: None,
                    details: report.differences,
                })
            }
        }
    }
}

fn checker_command(
    tokens: &[String],
    ctx: &VerifyContext<'_>,
) -> Result<CommandSpec, VerifyError> {
    let output_root = ctx.workspace.output_root.display().to_string();
    Ok(CommandSpec::from_rendered(ctx.subs.render_all(tokens)?)?.env("OUTPUT_ROOT", output_root))
}

async fn run_checker<R: ProcessRunner>(
    runner: &R,
    command: &CommandSpec,
) -> Result<Verdict, VerifyError> {
    let exit = runner.run(command).await?;
    if exit.is_success() {
        return Ok(Verdict::Passed);
    }
    let code = exit
        .code
        .map_or_else(|| "signal".to_owned(), |c| c.to_string());
    info!(command = command.command_line(), exit_code = %code, "checker reported differences");
    Ok(Verdict::Failed {
        exit_code: exit.code,
        details: vec![format!("'{}' exited with {code}", command.command_line())],
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use gantry_core::env::EnvSnapshot;
    use gantry_core::error::ProcessError;
    use gantry_core::process::ProcessExit;
    use gantry_core::scenario::ConnectorKind;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingRunner {
        exit_code: i32,
        calls: Arc<Mutex<Vec<CommandSpec>>>,
    }

    impl ProcessRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<ProcessExit, ProcessError> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(ProcessExit::with_code(self.exit_code))
        }
    }

    fn workspace() -> Workspace {
        Workspace::resolve(Path::new("/tmp/gantry-verify"), "s3").unwrap()
    }

    #[tokio::test]
    async fn diff_checker_gets_folder_name_and_output_root() {
        let runner = RecordingRunner::default();
        let ws = workspace();
        let env = EnvSnapshot::default();
        let subs = Substitutions::new(&env);
        let scenario = Scenario::new("s3", ConnectorKind::S3);
        let config = VerifyConfig::default();
        let ctx = VerifyContext {
            scenario: &scenario,
            workspace: &ws,
            config: &config,
            expected_root: Path::new("/unused"),
            subs: &subs,
        };

        let verdict = verify(&runner, &ctx).await.unwrap();

        assert!(verdict.is_passed());
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "test_e2e/check-diff-expected-output.sh");
        assert_eq!(calls[0].args, vec!["--output-folder-name", "s3"]);
        assert_eq!(
            calls[0].env.get("OUTPUT_ROOT").map(String::as_str),
            Some("/tmp/gantry-verify")
        );
    }

    #[tokio::test]
    async fn failing_checker_keeps_its_code() {
        let runner = RecordingRunner {
            exit_code: 3,
            ..Default::default()
        };
        let ws = workspace();
        let env = EnvSnapshot::default();
        let subs = Substitutions::new(&env).bind("name", "s3");
        let mut scenario = Scenario::new("s3", ConnectorKind::S3);
        scenario.verify = VerifySpec::Command {
            command: vec!["check-rows".to_owned(), "{name}".to_owned()],
        };
        let config = VerifyConfig::default();
        let ctx = VerifyContext {
            scenario: &scenario,
            workspace: &ws,
            config: &config,
            expected_root: Path::new("/unused"),
            subs: &subs,
        };

        let verdict = verify(&runner, &ctx).await.unwrap();

        match verdict {
            Verdict::Failed { exit_code, details } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(details, vec!["'check-rows s3' exited with 3"]);
            }
            Verdict::Passed => panic!("should fail"),
        }
    }

    #[tokio::test]
    async fn disabled_verification_runs_nothing() {
        let runner = RecordingRunner::default();
        let ws = workspace();
        let env = EnvSnapshot::default();
        let subs = Substitutions::new(&env);
        let mut scenario = Scenario::new("s3", ConnectorKind::S3);
        scenario.verify = VerifySpec::Disabled;
        let config = VerifyConfig::default();
        let ctx = VerifyContext {
            scenario: &scenario,
            workspace: &ws,
            config: &config,
            expected_root: Path::new("/unused"),
            subs: &subs,
        };

        assert!(verify(&runner, &ctx).await.unwrap().is_passed());
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
