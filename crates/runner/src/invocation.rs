//! Ingestion CLI command lines.
//!
//! `<ingest.program> <ingest.base_args...> <scenario.args...>`, every token
//! rendered against the run's workspace and environment snapshot.

use gantry_core::config::IngestConfig;
use gantry_core::env::EnvSnapshot;
use gantry_core::error::ProcessError;
use gantry_core::process::CommandSpec;
use gantry_core::scenario::Scenario;
use gantry_core::template::Substitutions;
use gantry_core::workspace::Workspace;

/// Placeholder bindings for one run.
pub fn substitutions<'a>(
    workspace: &Workspace,
    env: &'a EnvSnapshot,
    max_processes: usize,
) -> Substitutions<'a> {
    Substitutions::new(env)
        .bind("output_dir", workspace.output_dir.display().to_string())
        .bind("work_dir", workspace.work_dir.display().to_string())
        .bind("download_dir", workspace.download_dir.display().to_string())
        .bind("output_root", workspace.output_root.display().to_string())
        .bind("max_processes", max_processes.to_string())
        .bind("name", workspace.name.clone())
}

/// The full CLI command for `scenario`.
pub fn cli_command(
    ingest: &IngestConfig,
    scenario: &Scenario,
    subs: &Substitutions<'_>,
) -> Result<CommandSpec, ProcessError> {
    let tokens: Vec<String> = std::iter::once(&ingest.program)
        .chain(&ingest.base_args)
        .chain(&scenario.args)
        .cloned()
        .collect();
    let mut command = CommandSpec::from_rendered(subs.render_all(&tokens)?)?;
    for (key, value) in &scenario.env {
        command = command.env(key.clone(), subs.render(value)?.value);
    }
    Ok(command)
}
