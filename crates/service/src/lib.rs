#![doc = include_str!("../README.md")]

pub mod command;
pub mod container;
pub mod error;
pub mod provider;
pub mod readiness;
pub mod service;

pub use command::CommandService;
pub use container::{BollardRuntime, ContainerRequest, ContainerRuntime, ContainerService};
pub use error::ServiceError;
pub use provider::{DefaultServiceProvider, ServiceProvider};
pub use readiness::{Probe, ReadinessPolicy, wait_until_ready};
pub use service::{BoxFuture, DependencyService, DynService, Readiness, ServiceState};
