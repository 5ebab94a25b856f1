//! `gantry list` command handler

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use gantry_core::catalog::Catalog;
use gantry_core::env::EnvSnapshot;
use gantry_core::scenario::Scenario;

use crate::cli::ListArgs;
use crate::commands::suite::select;
use crate::context::HarnessContext;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub async fn execute(
    args: ListArgs,
    ctx: &HarnessContext,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let catalog = ctx.catalog().await?;
    let report = ScenarioList::build(&catalog, args.connector.as_deref(), &ctx.env);
    writer.render(&report)?;
    Ok(())
}

/// Catalog listing with per-scenario environment status.
#[derive(Debug, Serialize)]
pub struct ScenarioList {
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioEntry {
    pub name: String,
    pub connector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub verify: &'static str,
    /// All required variables are set and non-empty.
    pub ready: bool,
    pub missing_env: Vec<String>,
}

impl ScenarioList {
    pub fn build(catalog: &Catalog, connector: Option<&str>, env: &EnvSnapshot) -> Self {
        let scenarios = select(catalog, connector)
            .iter()
            .map(|scenario| ScenarioEntry::new(scenario, env))
            .collect();
        Self { scenarios }
    }
}

impl ScenarioEntry {
    fn new(scenario: &Scenario, env: &EnvSnapshot) -> Self {
        let missing_env = scenario.missing_env(env);
        Self {
            name: scenario.name.clone(),
            connector: scenario.connector.to_string(),
            service: scenario.service.as_ref().map(|s| s.name.clone()),
            verify: scenario.verify.label(),
            ready: missing_env.is_empty(),
            missing_env,
        }
    }
}

impl Render for ScenarioList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.scenarios.is_empty() {
            return writeln!(w, "No scenarios found.");
        }

        writeln!(
            w,
            "{:<32} {:<24} {:<16} {:<14} STATUS",
            "NAME", "CONNECTOR", "SERVICE", "VERIFY"
        )?;
        for entry in &self.scenarios {
            let status = if entry.ready {
                "ready".green().to_string()
            } else {
                format!("{} {}", "missing".yellow(), entry.missing_env.join(", "))
            };
            writeln!(
                w,
                "{:<32} {:<24} {:<16} {:<14} {}",
                entry.name,
                entry.connector,
                entry.service.as_deref().unwrap_or("-"),
                entry.verify,
                status
            )?;
        }
        let ready = self.scenarios.iter().filter(|e| e.ready).count();
        writeln!(w)?;
        writeln!(w, "{} scenarios, {} ready", self.scenarios.len(), ready)
    }
}
