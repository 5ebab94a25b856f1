//! Readiness polling.
//!
//! A service is polled with [`DynService::check_ready`] up to
//! `policy.attempts` times, sleeping `policy.interval` between checks.
//! A check that outlives `policy.probe_timeout` counts as a failed attempt.
//! Exhausting the attempts is [`ServiceError::NotReady`].

use std::time::Duration;

use gantry_core::config::ServiceConfig;
use gantry_core::process::{CommandSpec, ProcessRunner};
use gantry_core::scenario::ReadinessSpec;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::service::{DynService, Readiness};

/// Upper bound on one TCP connect attempt.
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single readiness check, rendered and ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Ready once the command exits 0.
    Command(CommandSpec),
    /// Ready once a TCP connection succeeds.
    Tcp(String),
    /// Ready once the managed container is running and healthy.
    Container,
}

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl ReadinessPolicy {
    /// Scenario values first, then the harness defaults.
    pub fn resolve(spec: Option<&ReadinessSpec>, defaults: &ServiceConfig) -> Self {
        let attempts = spec
            .and_then(|s| s.attempts)
            .unwrap_or(defaults.readiness_attempts)
            .max(1);
        let interval_ms = spec
            .and_then(|s| s.interval_ms)
            .unwrap_or(defaults.readiness_interval_ms);
        Self {
            attempts,
            interval: Duration::from_millis(interval_ms),
            probe_timeout: Duration::from_millis(defaults.probe_timeout_ms.max(1)),
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::resolve(None, &ServiceConfig::default())
    }
}

/// Try one TCP connection to `address`.
pub async fn check_tcp(address: &str) -> Readiness {
    match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(address)).await {
        Ok(Ok(_)) => Readiness::Ready,
        Ok(Err(e)) => Readiness::NotReady(format!("connect {address}: {e}")),
        Err(_) => Readiness::NotReady(format!("connect {address}: timed out")),
    }
}

/// Run a probe command once.
pub async fn check_command<R: ProcessRunner>(runner: &R, command: &CommandSpec) -> Readiness {
    match runner.run(command).await {
        Ok(exit) if exit.is_success() => Readiness::Ready,
        Ok(exit) => Readiness::NotReady(format!(
            "'{}' exited with {}",
            command.command_line(),
            exit.code.map_or_else(|| "signal".to_owned(), |c| c.to_string())
        )),
        Err(e) => Readiness::NotReady(e.to_string()),
    }
}

/// Poll `service` until ready. Returns the number of attempts used.
pub async fn wait_until_ready(
    service: &dyn DynService,
    policy: ReadinessPolicy,
) -> Result<u32, ServiceError> {
    let mut last = String::from("no readiness check ran");
    for attempt in 1..=policy.attempts {
        let readiness = tokio::time::timeout(policy.probe_timeout, service.check_ready())
            .await
            .unwrap_or_else(|_| {
                Readiness::NotReady(format!(
                    "check timed out after {} ms",
                    policy.probe_timeout.as_millis()
                ))
            });
        match readiness {
            Readiness::Ready => {
                info!(service = service.name(), attempt, "service ready");
                return Ok(attempt);
            }
            Readiness::NotReady(reason) => {
                debug!(
                    service = service.name(),
                    attempt,
                    max_attempts = policy.attempts,
                    reason = reason.as_str(),
                    "service not ready yet"
                );
                last = reason;
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(ServiceError::NotReady {
        service: service.name().to_owned(),
        attempts: policy.attempts,
        last,
    })
}
