//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`]; handlers never
//! switch on the format themselves. Logs go to stderr, so stdout stays
//! parseable in JSON mode.

use std::io::Write;

use colored::Colorize;
use gantry_core::outcome::RunOutcome;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes payloads to stdout in the selected format.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// Render a payload to any writer.
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Colored status label for an outcome.
pub fn status_label(outcome: &RunOutcome) -> colored::ColoredString {
    let label = outcome.label().to_uppercase();
    match outcome {
        RunOutcome::Passed => label.green().bold(),
        RunOutcome::Skipped { .. } => label.yellow().bold(),
        RunOutcome::Interrupted => label.magenta().bold(),
        _ => label.red().bold(),
    }
}
