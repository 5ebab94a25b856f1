//! Harness context shared by every subcommand.
//!
//! Resolves the config file, applies CLI overrides on top of env and file
//! values, and locates the scenario catalog relative to the config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use gantry_core::catalog::Catalog;
use gantry_core::config::{DEFAULT_CONFIG_FILE, GantryConfig};
use gantry_core::env::EnvSnapshot;
use gantry_core::process::TokioProcessRunner;
use gantry_runner::controller::{RunController, RunControllerBuilder};
use gantry_service::provider::DefaultServiceProvider;

use crate::cli::Cli;
use crate::error::CliError;

/// Controller wired to real processes and real dependency services.
pub type LiveController =
    RunController<TokioProcessRunner, DefaultServiceProvider<TokioProcessRunner>>;

/// Effective settings for one CLI invocation.
#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub config: GantryConfig,
    pub env: EnvSnapshot,
    /// Config file path, whether or not it exists.
    pub config_path: PathBuf,
    /// Directory relative paths in the config resolve against.
    pub base_dir: PathBuf,
    /// Catalog file or directory.
    pub catalog_path: PathBuf,
}

impl HarnessContext {
    /// Build the context from parsed arguments and the process environment.
    pub async fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        Self::resolve(cli, EnvSnapshot::capture()).await
    }

    /// Build the context against an explicit environment snapshot.
    pub async fn resolve(cli: &Cli, env: EnvSnapshot) -> Result<Self, CliError> {
        let explicit = cli.config.is_some();
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = GantryConfig::load_or_default(&config_path, explicit, &env).await?;
        if let Some(level) = &cli.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.general.log_format = format.clone();
        }
        config.validate()?;

        let base_dir = base_dir_of(&config_path)?;
        let catalog_path = match &cli.catalog {
            Some(path) => path.clone(),
            None => base_dir.join(&config.paths.catalog),
        };

        debug!(
            config = %config_path.display(),
            base_dir = %base_dir.display(),
            catalog = %catalog_path.display(),
            "resolved harness context"
        );

        Ok(Self {
            config,
            env,
            config_path,
            base_dir,
            catalog_path,
        })
    }

    /// Load and validate the scenario catalog.
    pub async fn catalog(&self) -> Result<Catalog, CliError> {
        Ok(Catalog::load(&self.catalog_path).await?)
    }

    /// Controller that spawns real processes and services.
    pub fn controller(&self) -> Result<LiveController, CliError> {
        let runner = Arc::new(TokioProcessRunner);
        let services = Arc::new(DefaultServiceProvider::new(
            Arc::clone(&runner),
            self.config.service.clone(),
        ));
        let controller = RunControllerBuilder::new()
            .config(self.config.clone())
            .env(self.env.clone())
            .base_dir(self.base_dir.clone())
            .runner(runner)
            .service_provider(services)
            .build()?;
        Ok(controller)
    }
}

/// Directory containing the config file, or the working directory for a
/// bare file name.
fn base_dir_of(config_path: &Path) -> Result<PathBuf, CliError> {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Ok(std::env::current_dir()?),
    }
}
