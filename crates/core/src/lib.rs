#![doc = include_str!("../README.md")]

pub mod catalog;
pub mod config;
pub mod env;
pub mod error;
pub mod outcome;
pub mod process;
pub mod scenario;
pub mod template;
pub mod workspace;

// --- re-exports ---

// errors
pub use error::{CatalogError, ConfigError, GantryError, ProcessError, WorkspaceError};

// config
pub use config::GantryConfig;
pub use env::EnvSnapshot;

// scenarios
pub use catalog::Catalog;
pub use scenario::{
    ConnectorKind, ProbeKind, ReadinessSpec, Scenario, ServiceKind, ServiceSpec, VerifySpec,
};

// run model
pub use outcome::{RunOutcome, RunStage};
pub use process::{CommandSpec, ProcessExit, ProcessRunner, TokioProcessRunner};
pub use template::Substitutions;
pub use workspace::{DownloadRetention, Workspace};
