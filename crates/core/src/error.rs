//! Error types -- one enum per domain, aggregated into [`GantryError`].
//!
//! Run failures that belong to the scenario under test (a failing CLI, a
//! fixture mismatch, missing credentials) are not errors: they are
//! [`RunOutcome`](crate::outcome::RunOutcome) variants. The types here cover
//! defects of the harness itself and its inputs.

/// Top-level gantry error.
#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    /// Configuration loading or validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Scenario catalog loading or validation.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Workspace path resolution or manipulation.
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Subprocess spawning or waiting.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Dependency service lifecycle.
    #[error("service error: {0}")]
    Service(String),

    /// Verification step could not be carried out.
    #[error("verification error: {0}")]
    Verify(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The config file is not valid TOML or does not match the schema.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds an unusable value.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scenario catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog path does not exist.
    #[error("catalog not found: {path}")]
    NotFound { path: String },

    /// A catalog file failed to parse.
    #[error("failed to parse catalog {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    /// Two scenarios share a name.
    #[error("duplicate scenario name '{name}'")]
    DuplicateName { name: String },

    /// A scenario definition is inconsistent.
    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    /// A requested scenario does not exist.
    #[error("unknown scenario '{name}'")]
    UnknownScenario { name: String },
}

/// Workspace errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The output root cannot be turned into an absolute directory path.
    #[error("cannot resolve output root '{path}': {reason}")]
    UnresolvableRoot { path: String, reason: String },

    /// The scenario name cannot be used as a directory name.
    #[error("scenario name '{name}' is not a valid path component")]
    InvalidName { name: String },
}

/// Subprocess errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The command line is empty.
    #[error("empty command line")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// Waiting on the child failed.
    #[error("failed to wait on '{program}': {reason}")]
    WaitFailed { program: String, reason: String },

    /// A placeholder or secret reference could not be substituted.
    #[error("unresolved reference '{reference}' in argument '{argument}'")]
    UnresolvedReference { reference: String, argument: String },
}
