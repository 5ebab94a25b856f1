//! gantry CLI library.
//!
//! Exposes the command handlers for integration testing. In production
//! `gantry` is used as a binary (main.rs).

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod logging;
pub mod output;
pub mod shutdown;

use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands};
use crate::context::HarnessContext;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Dispatch a parsed command and return the process exit code.
///
/// `ctx` is the already-resolved harness context; `config validate` reports
/// a failed resolution instead of propagating it.
pub async fn dispatch(
    cli: Cli,
    ctx: Result<HarnessContext, CliError>,
    cancel: CancellationToken,
) -> Result<i32, CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &ctx?, &writer, cancel).await,
        Commands::Suite(args) => commands::suite::execute(args, &ctx?, &writer, cancel).await,
        Commands::List(args) => {
            commands::list::execute(args, &ctx?, &writer).await?;
            Ok(0)
        }
        Commands::Config(args) => {
            let source = cli
                .config
                .as_ref()
                .map_or_else(|| "(default)".to_owned(), |p| p.display().to_string());
            commands::config::execute(args, ctx, source, &writer).await?;
            Ok(0)
        }
    }
}
