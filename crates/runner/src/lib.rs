#![doc = include_str!("../README.md")]

pub mod cleanup;
pub mod controller;
pub mod error;
pub mod fixtures;
pub mod invocation;
pub mod report;
pub mod suite;
pub mod verify;

pub use cleanup::{CleanupGuard, CleanupReport};
pub use controller::{RunController, RunControllerBuilder};
pub use error::VerifyError;
pub use fixtures::{FixtureCheck, FixtureReport};
pub use report::RunReport;
pub use suite::{SuiteOptions, SuiteSummary, run_suite};
pub use verify::{Verdict, VerifyContext};
