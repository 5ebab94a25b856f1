//! `gantry suite` command handler

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gantry_core::catalog::Catalog;
use gantry_core::scenario::{ConnectorKind, Scenario};
use gantry_runner::suite::run_suite;

use crate::cli::SuiteArgs;
use crate::commands::run::suite_options;
use crate::context::HarnessContext;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `suite` command and return the suite exit code.
pub async fn execute(
    args: SuiteArgs,
    ctx: &HarnessContext,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<i32, CliError> {
    let catalog = ctx.catalog().await?;
    let scenarios = select(&catalog, args.connector.as_deref());
    if scenarios.is_empty() {
        warn!(connector = ?args.connector, "no scenarios selected");
    }
    info!(count = scenarios.len(), "selected scenarios");

    let controller = ctx.controller()?;
    let options = suite_options(&args.suite);
    let summary = run_suite(&controller, scenarios, &options, cancel).await;
    writer.render(&summary)?;
    Ok(summary.exit_code)
}

/// Every scenario, or only those of `connector`, in name order.
pub fn select(catalog: &Catalog, connector: Option<&str>) -> Vec<Scenario> {
    match connector {
        Some(kind) => {
            let kind = ConnectorKind::from(kind);
            catalog.by_connector(&kind).cloned().collect()
        }
        None => catalog.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_scenarios(vec![
            Scenario::new("s3-minio", ConnectorKind::from("s3")),
            Scenario::new("local", ConnectorKind::Local),
            Scenario::new("s3", ConnectorKind::from("s3")),
        ])
        .expect("catalog should build")
    }

    #[test]
    fn select_all_is_name_ordered() {
        let names: Vec<_> = select(&catalog(), None)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["local", "s3", "s3-minio"]);
    }

    #[test]
    fn select_by_connector_filters() {
        let names: Vec<_> = select(&catalog(), Some("s3"))
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["s3", "s3-minio"]);
    }

    #[test]
    fn select_unknown_connector_is_empty() {
        assert!(select(&catalog(), Some("dropbox")).is_empty());
    }
}
