//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// gantry -- end-to-end connector test harness.
///
/// Use `gantry <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "gantry", version, about, long_about = None)]
pub struct Cli {
    /// Path to the gantry.toml configuration file [default: gantry.toml].
    ///
    /// A missing default file means built-in defaults; a missing explicit
    /// file is an error.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Scenario catalog file or directory, overriding `paths.catalog`.
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run named scenarios.
    Run(RunArgs),

    /// Run every scenario, or every scenario of one connector.
    Suite(SuiteArgs),

    /// List scenarios and whether their environment is satisfied.
    List(ListArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Options shared by `run` and `suite`.
#[derive(Args, Debug, Clone, Default)]
pub struct SuiteFlags {
    /// Scenarios run concurrently.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Report this scenario's failure without failing the suite. Repeatable.
    #[arg(long = "ignore-failure", value_name = "NAME")]
    pub ignore_failures: Vec<String>,

    /// Treat skipped scenarios as failures.
    #[arg(long)]
    pub fail_on_skip: bool,
}

// ---- run ----

/// Run scenarios by name.
///
/// With a single name the exit code is that scenario's exit code.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario names.
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,

    #[command(flatten)]
    pub suite: SuiteFlags,
}

// ---- suite ----

/// Run a filtered set of scenarios.
#[derive(Args, Debug)]
pub struct SuiteArgs {
    /// Only scenarios of this connector kind.
    #[arg(long)]
    pub connector: Option<String>,

    #[command(flatten)]
    pub suite: SuiteFlags,
}

// ---- list ----

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only scenarios of this connector kind.
    #[arg(long)]
    pub connector: Option<String>,
}

// ---- config ----

/// Manage gantry configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and scenario catalog.
    Validate,
    /// Show the effective configuration (defaults + file + env overrides).
    Show {
        /// Show only one section (general, paths, ingest, verify, service, retention).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_run_single() {
        let cli = Cli::try_parse_from(["gantry", "run", "local"]).expect("should parse run");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.names, vec!["local"]);
                assert_eq!(args.suite.jobs, 1, "jobs should default to 1");
                assert!(!args.suite.fail_on_skip);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_requires_a_name() {
        let result = Cli::try_parse_from(["gantry", "run"]);
        assert!(result.is_err(), "run without names should be rejected");
    }

    #[test]
    fn test_cli_parse_suite_flags() {
        let cli = Cli::try_parse_from([
            "gantry",
            "suite",
            "--connector",
            "s3",
            "--jobs",
            "4",
            "--ignore-failure",
            "s3-minio",
            "--ignore-failure",
            "s3-large",
            "--fail-on-skip",
        ])
        .expect("should parse suite");
        match cli.command {
            Commands::Suite(args) => {
                assert_eq!(args.connector.as_deref(), Some("s3"));
                assert_eq!(args.suite.jobs, 4);
                assert_eq!(args.suite.ignore_failures, vec!["s3-minio", "s3-large"]);
                assert!(args.suite.fail_on_skip);
            }
            _ => panic!("expected Suite command"),
        }
    }

    #[test]
    fn test_cli_parse_list() {
        let cli = Cli::try_parse_from(["gantry", "list"]).expect("should parse list");
        match cli.command {
            Commands::List(args) => assert!(args.connector.is_none()),
            _ => panic!("expected List command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["gantry", "config", "show", "--section", "ingest"])
            .expect("should parse config show");
        match cli.command {
            Commands::Config(args) => match args.action {
                ConfigAction::Show { section } => assert_eq!(section.as_deref(), Some("ingest")),
                ConfigAction::Validate => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gantry",
            "list",
            "--config",
            "/etc/gantry.toml",
            "--catalog",
            "scenarios/",
            "--output",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("should parse global flags");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/gantry.toml")));
        assert_eq!(cli.catalog, Some(PathBuf::from("scenarios/")));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_config_defaults_to_none() {
        let cli = Cli::try_parse_from(["gantry", "list"]).expect("should parse");
        assert!(cli.config.is_none(), "explicit config should be None");
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
