//! Command-driven services.
//!
//! The service is brought up and torn down by external commands, typically
//! `docker compose -f <file> up -d` and `docker compose -f <file> down -v`,
//! or a repository script that wraps them.

use std::sync::Arc;
use std::time::Duration;

use gantry_core::process::{CommandSpec, ProcessRunner};
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::readiness::{Probe, check_command, check_tcp};
use crate::service::{DependencyService, Readiness, ServiceState};

/// A service with explicit start and stop commands.
pub struct CommandService<R> {
    name: String,
    start: CommandSpec,
    stop: CommandSpec,
    probe: Option<Probe>,
    runner: Arc<R>,
    stop_timeout: Duration,
    state: ServiceState,
}

impl<R: ProcessRunner> CommandService<R> {
    pub fn new(
        name: impl Into<String>,
        start: CommandSpec,
        stop: CommandSpec,
        runner: Arc<R>,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            stop,
            probe: None,
            runner,
            stop_timeout: Duration::from_secs(10),
            state: ServiceState::Created,
        }
    }

    /// Attach a readiness probe. Container probes are not supported here.
    pub fn with_probe(mut self, probe: Probe) -> Result<Self, ServiceError> {
        if probe == Probe::Container {
            return Err(ServiceError::InvalidSpec {
                service: self.name,
                reason: "container probe requires a container service".to_owned(),
            });
        }
        self.probe = Some(probe);
        Ok(self)
    }

    /// Bound on the stop command; it is abandoned once exceeded.
    pub fn with_stop_timeout(mut self, secs: u64) -> Self {
        self.stop_timeout = Duration::from_secs(secs);
        self
    }
}

impl<R: ProcessRunner> DependencyService for CommandService<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        info!(
            service = %self.name,
            command = self.start.command_line(),
            "starting service"
        );
        let result = self.runner.run(&self.start).await;
        match result {
            Ok(exit) if exit.is_success() => {
                self.state = ServiceState::Running;
                Ok(())
            }
            Ok(exit) => {
                self.state = ServiceState::Failed;
                Err(ServiceError::StartFailed {
                    service: self.name.clone(),
                    reason: format!(
                        "start command exited with {}",
                        exit.code.map_or_else(|| "signal".to_owned(), |c| c.to_string())
                    ),
                })
            }
            Err(e) => {
                self.state = ServiceState::Failed;
                Err(ServiceError::StartFailed {
                    service: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn check_ready(&self) -> Readiness {
        match &self.probe {
            None => Readiness::Ready,
            Some(Probe::Command(command)) => check_command(self.runner.as_ref(), command).await,
            Some(Probe::Tcp(address)) => check_tcp(address).await,
            Some(Probe::Container) => {
                Readiness::NotReady("container probe on a command service".to_owned())
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        if self.state == ServiceState::Stopped {
            return Ok(());
        }
        info!(
            service = %self.name,
            command = self.stop.command_line(),
            "stopping service"
        );
        let outcome = tokio::time::timeout(self.stop_timeout, self.runner.run(&self.stop)).await;
        // Stopped once the command finished or timed out; a failed teardown is
        // reported, never retried.
        self.state = ServiceState::Stopped;
        let Ok(result) = outcome else {
            warn!(
                service = %self.name,
                timeout_secs = self.stop_timeout.as_secs(),
                "stop command timed out"
            );
            return Err(ServiceError::StopFailed {
                service: self.name.clone(),
                reason: format!(
                    "stop command timed out after {}s",
                    self.stop_timeout.as_secs()
                ),
            });
        };
        match result {
            Ok(exit) if exit.is_success() => Ok(()),
            Ok(exit) => {
                warn!(service = %self.name, exit_code = ?exit.code, "stop command failed");
                Err(ServiceError::StopFailed {
                    service: self.name.clone(),
                    reason: format!("stop command exited with {:?}", exit.code),
                })
            }
            Err(e) => Err(ServiceError::StopFailed {
                service: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
