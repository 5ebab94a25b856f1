//! Test run controller.
//!
//! One scenario run walks these stages:
//!
//! ```text
//! Init -> PathsResolved -> (Skipped | ServiceReady) -> (CliExecuted | Failed)
//!      -> (Verified | Failed) -> Cleaned
//! ```
//!
//! The credential gate runs before any directory is created, any service is
//! started or the CLI is invoked. Once paths are resolved a [`CleanupGuard`]
//! owns teardown; the run future is raced against a cancellation token and
//! the guard is released afterwards whatever the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use gantry_core::config::GantryConfig;
use gantry_core::env::EnvSnapshot;
use gantry_core::error::{ConfigError, GantryError, WorkspaceError};
use gantry_core::outcome::{RunOutcome, RunStage};
use gantry_core::process::ProcessRunner;
use gantry_core::scenario::Scenario;
use gantry_core::workspace::Workspace;
use gantry_service::{ReadinessPolicy, ServiceProvider, wait_until_ready};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::cleanup::{CleanupGuard, CleanupReport};
use crate::invocation;
use crate::report::RunReport;
use crate::verify::{Verdict, VerifyContext, verify};

/// Runs scenarios against one configuration.
///
/// # Usage
///
/// ```ignore
/// let controller = RunControllerBuilder::new()
///     .config(config)
///     .env(EnvSnapshot::capture())
///     .base_dir(config_dir)
///     .runner(Arc::new(TokioProcessRunner))
///     .service_provider(Arc::new(provider))
///     .build()?;
///
/// let report = controller.run(&scenario).await;
/// std::process::exit(report.exit_code());
/// ```
pub struct RunController<R, P> {
    config: Arc<GantryConfig>,
    env: Arc<EnvSnapshot>,
    /// Directory relative paths in the config are resolved against.
    base_dir: PathBuf,
    runner: Arc<R>,
    services: Arc<P>,
}

impl<R, P> Clone for RunController<R, P> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            env: Arc::clone(&self.env),
            base_dir: self.base_dir.clone(),
            runner: Arc::clone(&self.runner),
            services: Arc::clone(&self.services),
        }
    }
}

impl<R: ProcessRunner, P: ServiceProvider> RunController<R, P> {
    pub fn config(&self) -> &GantryConfig {
        &self.config
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Workspace paths `scenario` would use. Pure.
    pub fn workspace(&self, scenario: &Scenario) -> Result<Workspace, WorkspaceError> {
        let root = self.config.output_root(&self.base_dir)?;
        Workspace::resolve(&root, &scenario.name)
    }

    /// Run `scenario` to completion.
    pub async fn run(&self, scenario: &Scenario) -> RunReport {
        self.run_with_cancel(scenario, CancellationToken::new()).await
    }

    /// Run `scenario`, ending it as interrupted once `cancel` fires.
    ///
    /// Cleanup is awaited in both cases before the report is returned.
    pub async fn run_with_cancel(
        &self,
        scenario: &Scenario,
        cancel: CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("scenario", name = %scenario.name, %run_id);
        self.execute(run_id, scenario, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        scenario: &Scenario,
        cancel: CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut stages = vec![RunStage::Init];

        let workspace = match self.workspace(scenario) {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "cannot resolve workspace");
                stages.push(RunStage::Failed);
                let outcome = RunOutcome::ConfigurationError {
                    reason: e.to_string(),
                };
                return self.report(run_id, scenario, outcome, stages, started, None);
            }
        };
        stages.push(RunStage::PathsResolved);
        debug!(output_dir = %workspace.output_dir.display(), "paths resolved");

        let purge_downloads = self
            .config
            .retention
            .purges_downloads(scenario.download_retention);
        let mut guard = CleanupGuard::new(workspace, purge_downloads);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => RunOutcome::Interrupted,
            outcome = self.drive(scenario, &mut guard, &mut stages) => outcome,
        };
        if outcome == RunOutcome::Interrupted {
            warn!("run interrupted");
            stages.push(RunStage::Failed);
        }

        let cleanup = guard.release().await;
        stages.push(RunStage::Cleaned);

        self.report(run_id, scenario, outcome, stages, started, Some(cleanup))
    }

    fn report(
        &self,
        run_id: Uuid,
        scenario: &Scenario,
        outcome: RunOutcome,
        stages: Vec<RunStage>,
        started: Instant,
        cleanup: Option<CleanupReport>,
    ) -> RunReport {
        let report = RunReport::new(
            run_id,
            scenario.name.clone(),
            scenario.connector.clone(),
            outcome,
            stages,
            started.elapsed(),
            cleanup,
        );
        if report.outcome.is_failure() {
            warn!(
                outcome = %report.outcome,
                exit_code = report.exit_code,
                duration_ms = report.duration_ms,
                "scenario failed"
            );
        } else {
            info!(
                outcome = report.outcome.label(),
                exit_code = report.exit_code,
                duration_ms = report.duration_ms,
                "scenario finished"
            );
        }
        report
    }

    /// Gate, service, CLI, verification. Teardown is left to the guard.
    async fn drive(
        &self,
        scenario: &Scenario,
        guard: &mut CleanupGuard,
        stages: &mut Vec<RunStage>,
    ) -> RunOutcome {
        let missing_env = scenario.missing_env(&self.env);
        if !missing_env.is_empty() {
            warn!(missing = ?missing_env, "required environment not set, skipping");
            stages.push(RunStage::Skipped);
            return RunOutcome::Skipped { missing_env };
        }

        let workspace = guard.workspace().clone();
        if let Err(e) = workspace.create().await {
            stages.push(RunStage::Failed);
            return RunOutcome::ConfigurationError {
                reason: format!("cannot create workspace: {e}"),
            };
        }

        let subs = invocation::substitutions(
            &workspace,
            &self.env,
            self.config.effective_max_processes(),
        );

        if let Some(spec) = &scenario.service {
            let failed = |reason: String| RunOutcome::ServiceStartupFailure {
                service: spec.name.clone(),
                reason,
            };
            let service = match self.services.provision(&scenario.name, spec, &subs) {
                Ok(service) => guard.attach_service(service),
                Err(e) => {
                    stages.push(RunStage::Failed);
                    return failed(e.to_string());
                }
            };
            info!(service = %spec.name, "starting dependency service");
            if let Err(e) = service.start().await {
                stages.push(RunStage::Failed);
                return failed(e.to_string());
            }
            let policy = ReadinessPolicy::resolve(spec.readiness.as_ref(), &self.config.service);
            if let Err(e) = wait_until_ready(&*service, policy).await {
                stages.push(RunStage::Failed);
                return failed(e.to_string());
            }
            stages.push(RunStage::ServiceReady);
        }

        let command = match invocation::cli_command(&self.config.ingest, scenario, &subs) {
            Ok(command) => command,
            Err(e) => {
                stages.push(RunStage::Failed);
                return RunOutcome::ConfigurationError {
                    reason: e.to_string(),
                };
            }
        };
        info!(command = command.command_line(), "invoking ingestion cli");
        match self.runner.run(&command).await {
            Ok(exit) if exit.is_success() => stages.push(RunStage::CliExecuted),
            Ok(exit) => {
                stages.push(RunStage::Failed);
                let code = exit
                    .code
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string());
                let reason = format!("'{}' exited with {code}", command.program);
                return RunOutcome::cli_failed(exit.code, reason);
            }
            Err(e) => {
                stages.push(RunStage::Failed);
                return RunOutcome::cli_failed(None, e.to_string());
            }
        }

        let expected_root = self
            .config
            .expected_root(&self.base_dir, &workspace.output_root);
        let ctx = VerifyContext {
            scenario,
            workspace: &workspace,
            config: &self.config.verify,
            expected_root: &expected_root,
            subs: &subs,
        };
        match verify(&*self.runner, &ctx).await {
            Ok(Verdict::Passed) => {
                stages.push(RunStage::Verified);
                RunOutcome::Passed
            }
            Ok(Verdict::Failed { exit_code, details }) => {
                stages.push(RunStage::Failed);
                RunOutcome::verification_failed(exit_code, details)
            }
            Err(e) => {
                stages.push(RunStage::Failed);
                RunOutcome::verification_failed(None, vec![e.to_string()])
            }
        }
    }
}

/// Builder for [`RunController`].
pub struct RunControllerBuilder<R, P> {
    config: GantryConfig,
    env: EnvSnapshot,
    base_dir: PathBuf,
    runner: Option<Arc<R>>,
    services: Option<Arc<P>>,
}

impl<R: ProcessRunner, P: ServiceProvider> RunControllerBuilder<R, P> {
    pub fn new() -> Self {
        Self {
            config: GantryConfig::default(),
            env: EnvSnapshot::default(),
            base_dir: PathBuf::from("."),
            runner: None,
            services: None,
        }
    }

    pub fn config(mut self, config: GantryConfig) -> Self {
        self.config = config;
        self
    }

    /// Environment snapshot the gate and `${VAR}` substitution read. Empty by default.
    pub fn env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    /// Directory relative config paths are resolved against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn runner(mut self, runner: Arc<R>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn service_provider(mut self, services: Arc<P>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn build(self) -> Result<RunController<R, P>, GantryError> {
        self.config.validate()?;

        let runner = self.runner.ok_or_else(|| ConfigError::InvalidValue {
            field: "runner".to_owned(),
            reason: "process runner must be provided".to_owned(),
        })?;
        let services = self.services.ok_or_else(|| ConfigError::InvalidValue {
            field: "service_provider".to_owned(),
            reason: "service provider must be provided".to_owned(),
        })?;

        Ok(RunController {
            config: Arc::new(self.config),
            env: Arc::new(self.env),
            base_dir: self.base_dir,
            runner,
            services,
        })
    }
}

impl<R: ProcessRunner, P: ServiceProvider> Default for RunControllerBuilder<R, P> {
    fn default() -> Self {
        Self::new()
    }
}
