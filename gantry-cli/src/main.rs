use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use gantry_cli::cli::Cli;
use gantry_cli::context::HarnessContext;
use gantry_cli::{dispatch, logging, shutdown};
use gantry_core::config::GeneralConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let ctx = HarnessContext::from_cli(&cli).await;

    let general = match &ctx {
        Ok(ctx) => ctx.config.general.clone(),
        Err(_) => fallback_logging(&cli),
    };
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("gantry: {e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    if let Err(e) = shutdown::cancel_on_signal(cancel.clone()) {
        eprintln!("gantry: {e}");
        return ExitCode::from(exit_byte(e.exit_code()));
    }

    match dispatch(cli, ctx, cancel).await {
        Ok(code) => ExitCode::from(exit_byte(code)),
        Err(e) => {
            eprintln!("gantry: {e}");
            ExitCode::from(exit_byte(e.exit_code()))
        }
    }
}

/// Logging settings when the config itself failed to load.
fn fallback_logging(cli: &Cli) -> GeneralConfig {
    let mut general = GeneralConfig::default();
    if let Some(level) = cli.log_level.as_ref().filter(|l| is_known_level(l)) {
        general.log_level = level.clone();
    }
    if let Some(format) = cli.log_format.as_ref().filter(|f| *f == "json") {
        general.log_format = format.clone();
    }
    general
}

fn is_known_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
