//! Dependency-service lifecycle.
//!
//! [`DependencyService`] is the implementation trait (RPITIT);
//! [`DynService`] is its object-safe twin, blanket-implemented for every
//! `DependencyService` so runners can hold `Box<dyn DynService>`.
//!
//! # Lifecycle
//! ```text
//! Created -> start() -> Running -> stop() -> Stopped
//!               |
//!               +-> Failed -> stop() -> Stopped
//! ```
//!
//! `stop()` is valid from every state except `Stopped`, where it is a no-op:
//! a service whose start failed half-way still gets its teardown.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Boxed future used by [`DynService`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── ServiceState ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Created,
    Running,
    Failed,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ─── Readiness ───────────────────────────────────────────────────────

/// Result of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

// ─── DependencyService ───────────────────────────────────────────────

/// An external process or container a scenario depends on.
pub trait DependencyService: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    /// Bring the service up. Readiness is checked separately.
    fn start(&mut self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// One readiness check. Services without a probe are always ready.
    fn check_ready(&self) -> impl Future<Output = Readiness> + Send;

    /// Tear the service down. A no-op once stopped.
    fn stop(&mut self) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

// ─── DynService ──────────────────────────────────────────────────────

/// Object-safe form of [`DependencyService`].
pub trait DynService: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    fn start(&mut self) -> BoxFuture<'_, Result<(), ServiceError>>;

    fn check_ready(&self) -> BoxFuture<'_, Readiness>;

    fn stop(&mut self) -> BoxFuture<'_, Result<(), ServiceError>>;
}

impl<T: DependencyService> DynService for T {
    fn name(&self) -> &str {
        DependencyService::name(self)
    }

    fn state(&self) -> ServiceState {
        DependencyService::state(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(DependencyService::start(self))
    }

    fn check_ready(&self) -> BoxFuture<'_, Readiness> {
        Box::pin(DependencyService::check_ready(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(DependencyService::stop(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ToggleService {
        state: ServiceState,
        stops: u32,
    }

    impl DependencyService for ToggleService {
        fn name(&self) -> &str {
            "toggle"
        }

        fn state(&self) -> ServiceState {
            self.state
        }

        async fn start(&mut self) -> Result<(), ServiceError> {
            self.state = ServiceState::Running;
            Ok(())
        }

        async fn check_ready(&self) -> Readiness {
            if self.state == ServiceState::Running {
                Readiness::Ready
            } else {
                Readiness::NotReady("not running".to_owned())
            }
        }

        async fn stop(&mut self) -> Result<(), ServiceError> {
            self.stops += 1;
            self.state = ServiceState::Stopped;
            Ok(())
        }
    }

    #[tokio::test]
    async fn dyn_service_forwards_to_implementation() {
        let mut service: Box<dyn DynService> = Box::new(ToggleService {
            state: ServiceState::Created,
            stops: 0,
        });
        assert!(!service.check_ready().await.is_ready());
        service.start().await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        assert!(service.check_ready().await.is_ready());
        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.name(), "toggle");
    }

    #[test]
    fn boxed_service_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<Box<dyn DynService>>();
    }

    #[test]
    fn state_display() {
        assert_eq!(ServiceState::Running.to_string(), "running");
        assert_eq!(ServiceState::Stopped.to_string(), "stopped");
    }
}
