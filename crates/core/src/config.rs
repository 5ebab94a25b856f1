//! Harness configuration -- `gantry.toml` parsing and runtime settings.
//!
//! [`GantryConfig`] holds every section of the harness configuration.
//!
//! # Load order
//! 1. CLI flags (highest)
//! 2. Environment variables (`OUTPUT_ROOT`, `MAX_PROCESSES`, `CI`,
//!    `OVERWRITE_FIXTURES`, then `GANTRY_{SECTION}_{FIELD}`)
//! 3. Config file (`gantry.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), gantry_core::error::GantryError> {
//! use gantry_core::config::GantryConfig;
//! use gantry_core::env::EnvSnapshot;
//!
//! let env = EnvSnapshot::capture();
//! let config = GantryConfig::load("gantry.toml", &env).await?;
//!
//! let config = GantryConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::env::{EnvSnapshot, parse_flag};
use crate::error::{ConfigError, GantryError, WorkspaceError};
use crate::workspace::{DownloadRetention, EXPECTED_SUBDIR, resolve_output_root};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "gantry.toml";

/// Fields excluded from fixture comparison unless configured otherwise.
pub const DEFAULT_EXCLUDE_FIELDS: &[&str] = &[
    "metadata.date_processed",
    "metadata.data_source.date_processed",
    "local_download_path",
];

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: &[&str] = &["json", "pretty"];

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GantryConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl GantryConfig {
    /// Load a file, apply environment overrides, validate.
    pub async fn load(path: impl AsRef<Path>, env: &EnvSnapshot) -> Result<Self, GantryError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    /// unless `explicit` is set.
    pub async fn load_or_default(
        path: impl AsRef<Path>,
        explicit: bool,
        env: &EnvSnapshot,
    ) -> Result<Self, GantryError> {
        let path = path.as_ref();
        if !explicit && !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let mut config = Self::default();
            config.apply_env_overrides(env);
            config.validate()?;
            return Ok(config);
        }
        Self::load(path, env).await
    }

    /// Load a file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, GantryError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GantryError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GantryError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn parse(toml_str: &str) -> Result<Self, GantryError> {
        toml::from_str(toml_str).map_err(|e| {
            GantryError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Apply environment overrides.
    ///
    /// The unprefixed variables shared with CI scripts are applied first, so
    /// an explicit `GANTRY_{SECTION}_{FIELD}` wins over them.
    pub fn apply_env_overrides(&mut self, env: &EnvSnapshot) {
        if let Some(root) = env.get_non_empty("OUTPUT_ROOT") {
            self.paths.output_root = Some(root.to_owned());
        }
        override_opt_usize(&mut self.ingest.max_processes, env, "MAX_PROCESSES");
        override_bool(&mut self.retention.ci, env, "CI");
        override_bool(&mut self.verify.overwrite_fixtures, env, "OVERWRITE_FIXTURES");

        // General
        override_string(&mut self.general.log_level, env, "GANTRY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, env, "GANTRY_GENERAL_LOG_FORMAT");

        // Paths
        override_opt_string(&mut self.paths.output_root, env, "GANTRY_PATHS_OUTPUT_ROOT");
        override_opt_string(&mut self.paths.expected_root, env, "GANTRY_PATHS_EXPECTED_ROOT");
        override_string(&mut self.paths.catalog, env, "GANTRY_PATHS_CATALOG");

        // Ingest
        override_string(&mut self.ingest.program, env, "GANTRY_INGEST_PROGRAM");
        override_words(&mut self.ingest.base_args, env, "GANTRY_INGEST_BASE_ARGS");
        override_opt_usize(
            &mut self.ingest.max_processes,
            env,
            "GANTRY_INGEST_MAX_PROCESSES",
        );

        // Verify
        override_words(&mut self.verify.diff_checker, env, "GANTRY_VERIFY_DIFF_CHECKER");
        override_bool(
            &mut self.verify.overwrite_fixtures,
            env,
            "GANTRY_VERIFY_OVERWRITE_FIXTURES",
        );

        // Service
        override_u32(
            &mut self.service.readiness_attempts,
            env,
            "GANTRY_SERVICE_READINESS_ATTEMPTS",
        );
        override_u64(
            &mut self.service.readiness_interval_ms,
            env,
            "GANTRY_SERVICE_READINESS_INTERVAL_MS",
        );
        override_u64(
            &mut self.service.probe_timeout_ms,
            env,
            "GANTRY_SERVICE_PROBE_TIMEOUT_MS",
        );
        override_opt_string(
            &mut self.service.docker_socket,
            env,
            "GANTRY_SERVICE_DOCKER_SOCKET",
        );

        // Retention
        if let Some(val) = env.get("GANTRY_RETENTION_DOWNLOAD") {
            match val.parse::<DownloadRetention>() {
                Ok(parsed) => self.retention.download = parsed,
                Err(reason) => warn!(
                    env_key = "GANTRY_RETENTION_DOWNLOAD",
                    value = val,
                    %reason,
                    "failed to parse retention policy from env var, ignoring"
                ),
            }
        }
        override_bool(&mut self.retention.ci, env, "GANTRY_RETENTION_CI");
    }

    /// Check values.
    pub fn validate(&self) -> Result<(), GantryError> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", VALID_LOG_FORMATS.join(", ")),
            ));
        }

        if self.paths.catalog.trim().is_empty() {
            return Err(invalid("paths.catalog", "must not be empty".to_owned()));
        }

        if self.ingest.program.trim().is_empty() {
            return Err(invalid("ingest.program", "must not be empty".to_owned()));
        }

        if self.ingest.max_processes == Some(0) {
            return Err(invalid("ingest.max_processes", "must be at least 1".to_owned()));
        }

        if self.verify.diff_checker.is_empty() {
            return Err(invalid(
                "verify.diff_checker",
                "must name a command".to_owned(),
            ));
        }

        if self.service.readiness_attempts == 0 {
            return Err(invalid(
                "service.readiness_attempts",
                "must be at least 1".to_owned(),
            ));
        }

        if self.service.probe_timeout_ms == 0 {
            return Err(invalid(
                "service.probe_timeout_ms",
                "must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }

    /// Worker count handed to the CLI as `{max_processes}`.
    pub fn effective_max_processes(&self) -> usize {
        self.ingest.max_processes.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Absolute output root; relative values are taken against `base_dir`.
    pub fn output_root(&self, base_dir: &Path) -> Result<PathBuf, WorkspaceError> {
        resolve_output_root(self.paths.output_root.as_deref(), base_dir)
    }

    /// Root of the golden fixtures, defaulting to a directory under the output root.
    pub fn expected_root(&self, base_dir: &Path, output_root: &Path) -> PathBuf {
        match self.paths.expected_root.as_deref() {
            Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
            Some(path) => base_dir.join(path),
            None => output_root.join(EXPECTED_SUBDIR),
        }
    }
}

fn invalid(field: &str, reason: String) -> GantryError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of every per-scenario workspace. Defaults to the config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_root: Option<String>,
    /// Root of the golden fixtures used by `fixtures` verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_root: Option<String>,
    /// Scenario catalog file or directory.
    pub catalog: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            expected_root: None,
            catalog: "scenarios".to_owned(),
        }
    }
}

/// The ingestion CLI under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub program: String,
    /// Prepended to every scenario's arguments.
    pub base_args: Vec<String>,
    /// Defaults to the host CPU count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            program: "unstructured-ingest".to_owned(),
            base_args: Vec::new(),
            max_processes: None,
        }
    }
}

/// Output verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Diff-checker command; `--output-folder-name <name>` is appended.
    pub diff_checker: Vec<String>,
    /// Replace golden fixtures with actual output instead of comparing.
    pub overwrite_fixtures: bool,
    /// Dotted field paths ignored by fixture comparison.
    pub exclude_fields: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            diff_checker: vec!["test_e2e/check-diff-expected-output.sh".to_owned()],
            overwrite_fixtures: false,
            exclude_fields: DEFAULT_EXCLUDE_FIELDS
                .iter()
                .map(|f| (*f).to_owned())
                .collect(),
        }
    }
}

/// Dependency-service defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    /// Upper bound on a single readiness check.
    pub probe_timeout_ms: u64,
    /// Docker socket path; platform default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,
    /// Grace period before a container is killed on stop. Also bounds a
    /// stop command.
    pub stop_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            readiness_attempts: 30,
            readiness_interval_ms: 1000,
            probe_timeout_ms: 5000,
            docker_socket: None,
            stop_timeout_secs: 10,
        }
    }
}

/// What survives a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub download: DownloadRetention,
    /// Running under continuous integration (`CI`).
    pub ci: bool,
}

impl RetentionConfig {
    /// Whether downloads are purged, given a per-scenario override.
    pub fn purges_downloads(&self, scenario_override: Option<DownloadRetention>) -> bool {
        scenario_override.unwrap_or(self.download).purges(self.ci)
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        *target = val.to_owned();
    }
}

fn override_opt_string(target: &mut Option<String>, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        *target = (!val.is_empty()).then(|| val.to_owned());
    }
}

fn override_bool(target: &mut bool, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        match parse_flag(val) {
            Some(parsed) => *target = parsed,
            None => warn!(
                env_key,
                value = val,
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_opt_usize(target: &mut Option<usize>, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get_non_empty(env_key) {
        match val.trim().parse::<usize>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val,
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        match val.trim().parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val,
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        match val.trim().parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val,
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_words(target: &mut Vec<String>, env: &EnvSnapshot, env_key: &str) {
    if let Some(val) = env.get(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
