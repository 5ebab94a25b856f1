//! Subprocess seam.
//!
//! Every external program the harness touches (the ingestion CLI, the
//! diff-checker, service start/stop commands, probe commands) is spawned
//! through a [`ProcessRunner`]. Production code uses [`TokioProcessRunner`];
//! tests substitute recording stubs.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tracing::debug;

use crate::error::ProcessError;
use crate::template::Rendered;

/// A fully rendered command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    /// Loggable command line with secrets redacted.
    display: String,
}

impl CommandSpec {
    /// Command with no secrets; the display line is the literal argv.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let display =
            display_line(std::iter::once(program.as_str()).chain(args.iter().map(String::as_str)));
        Self {
            program,
            args,
            env: BTreeMap::new(),
            current_dir: None,
            display,
        }
    }

    /// Split a literal argv into program and arguments.
    pub fn from_argv(argv: &[String]) -> Result<Self, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    /// Build from rendered tokens, keeping the redacted display form.
    pub fn from_rendered(tokens: Vec<Rendered>) -> Result<Self, ProcessError> {
        let mut tokens = tokens.into_iter();
        let program = tokens.next().ok_or(ProcessError::EmptyCommand)?;
        let mut args = Vec::new();
        let mut shown = vec![program.display];
        for token in tokens {
            args.push(token.value);
            shown.push(token.display);
        }
        Ok(Self {
            program: program.value,
            args,
            env: BTreeMap::new(),
            current_dir: None,
            display: display_line(shown.iter().map(String::as_str)),
        })
    }

    /// Append literal arguments.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        self.display.push(' ');
        self.display.push_str(&quote(&arg));
        self.args.push(arg);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Command line safe to log.
    pub fn command_line(&self) -> &str {
        &self.display
    }
}

fn quote(token: &str) -> String {
    if token.is_empty() || token.contains(char::is_whitespace) {
        format!("'{token}'")
    } else {
        token.to_owned()
    }
}

fn display_line<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.map(quote).collect::<Vec<_>>().join(" ")
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns a command and waits for it.
///
/// Dropping the returned future must terminate the child, so cancelling a run
/// never leaves an orphaned CLI writing into a directory being removed.
pub trait ProcessRunner: Send + Sync + 'static {
    fn run(
        &self,
        spec: &CommandSpec,
    ) -> impl Future<Output = Result<ProcessExit, ProcessError>> + Send;
}

impl<R: ProcessRunner> ProcessRunner for Arc<R> {
    fn run(
        &self,
        spec: &CommandSpec,
    ) -> impl Future<Output = Result<ProcessExit, ProcessError>> + Send {
        (**self).run(spec)
    }
}

/// Runs commands with `tokio::process`, inheriting stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessExit, ProcessError> {
        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        debug!(command = spec.command_line(), "spawning");
        let mut child = command.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;
        let status = child.wait().await.map_err(|e| ProcessError::WaitFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}
