//! `gantry config` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use gantry_core::config::GantryConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::context::HarnessContext;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &[&str] = &["general", "paths", "ingest", "verify", "service", "retention"];

/// Execute the `config` command.
///
/// Takes the context as a `Result` so `validate` can report load failures
/// instead of aborting on them.
pub async fn execute(
    args: ConfigArgs,
    ctx: Result<HarnessContext, CliError>,
    source: String,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(ctx, source, writer).await,
        ConfigAction::Show { section } => execute_show(ctx?, section, writer),
    }
}

/// Load config and catalog, reporting every problem found.
///
/// # Errors
///
/// Returns `CliError::Config` when either is invalid, after rendering the report.
async fn execute_validate(
    ctx: Result<HarnessContext, CliError>,
    source: String,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = ValidationReport::collect(ctx, source).await;
    info!(valid = report.valid, "configuration validated");
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Show the effective configuration, optionally one section of it.
///
/// # Errors
///
/// Returns `CliError::Command` for an unknown section name.
fn execute_show(
    ctx: HarnessContext,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = ConfigReport::build(&ctx, section.as_deref())?;
    writer.render(&report)
}

/// Outcome of `config validate`.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub catalog: Option<String>,
    pub scenarios: usize,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub async fn collect(ctx: Result<HarnessContext, CliError>, source: String) -> Self {
        let ctx = match ctx {
            Ok(ctx) => ctx,
            Err(e) => {
                return Self {
                    source,
                    catalog: None,
                    scenarios: 0,
                    valid: false,
                    errors: vec![e.to_string()],
                };
            }
        };

        let catalog_source = Some(ctx.catalog_path.display().to_string());
        match ctx.catalog().await {
            Ok(catalog) => Self {
                source,
                catalog: catalog_source,
                scenarios: catalog.len(),
                valid: true,
                errors: Vec::new(),
            },
            Err(e) => Self {
                source,
                catalog: catalog_source,
                scenarios: 0,
                valid: false,
                errors: vec![e.to_string()],
            },
        }
    }
}

impl Render for ValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.valid {
            writeln!(w, "Configuration is valid: {}", self.source)?;
            if let Some(catalog) = &self.catalog {
                writeln!(w, "Catalog: {} ({} scenarios)", catalog, self.scenarios)?;
            }
        } else {
            writeln!(w, "Configuration is invalid: {}", self.source)?;
            for err in &self.errors {
                writeln!(w, "  - {}", err)?;
            }
        }
        Ok(())
    }
}

/// Effective configuration rendered as TOML.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config_toml: String,
}

impl ConfigReport {
    pub fn build(ctx: &HarnessContext, section: Option<&str>) -> Result<Self, CliError> {
        let config_toml = match section {
            None => to_toml(&ctx.config),
            Some(name) => section_toml(&ctx.config, name)?,
        };
        Ok(Self {
            source: ctx.config_path.display().to_string(),
            section: section.map(str::to_owned),
            config_toml,
        })
    }
}

fn section_toml(config: &GantryConfig, name: &str) -> Result<String, CliError> {
    let rendered = match name {
        "general" => to_toml(&config.general),
        "paths" => to_toml(&config.paths),
        "ingest" => to_toml(&config.ingest),
        "verify" => to_toml(&config.verify),
        "service" => to_toml(&config.service),
        "retention" => to_toml(&config.retention),
        _ => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                name,
                SECTIONS.join(", ")
            )));
        }
    };
    Ok(rendered)
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match &self.section {
            Some(section) => writeln!(w, "# Section: [{}] from {}", section, self.source)?,
            None => writeln!(w, "# Effective configuration from {}", self.source)?,
        }
        write!(w, "{}", self.config_toml)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use gantry_core::env::EnvSnapshot;

    use super::*;

    fn context() -> HarnessContext {
        HarnessContext {
            config: GantryConfig::default(),
            env: EnvSnapshot::default(),
            config_path: PathBuf::from("gantry.toml"),
            base_dir: PathBuf::from("."),
            catalog_path: PathBuf::from("scenarios"),
        }
    }

    #[tokio::test]
    async fn validate_reports_context_error() {
        let ctx = Err(CliError::Config("bad value".to_owned()));
        let report = ValidationReport::collect(ctx, "gantry.toml".to_owned()).await;
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["configuration error: bad value"]);
    }

    #[tokio::test]
    async fn validate_reports_missing_catalog() {
        let mut ctx = context();
        ctx.catalog_path = PathBuf::from("/nonexistent/gantry/scenarios");
        let report = ValidationReport::collect(Ok(ctx), "gantry.toml".to_owned()).await;
        assert!(!report.valid);
        assert_eq!(report.catalog.as_deref(), Some("/nonexistent/gantry/scenarios"));
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn show_full_config_contains_every_section() {
        let report = ConfigReport::build(&context(), None).expect("should build");
        for section in SECTIONS {
            assert!(
                report.config_toml.contains(&format!("[{section}]")),
                "missing [{section}]"
            );
        }
    }

    #[test]
    fn show_single_section() {
        let report = ConfigReport::build(&context(), Some("ingest")).expect("should build");
        assert_eq!(report.section.as_deref(), Some("ingest"));
        assert!(report.config_toml.contains("program = \"unstructured-ingest\""));
        assert!(!report.config_toml.contains("log_level"));
    }

    #[test]
    fn show_unknown_section_is_rejected() {
        let err = ConfigReport::build(&context(), Some("ebpf")).expect_err("should reject");
        assert!(err.to_string().contains("unknown section: ebpf"));
    }
}
