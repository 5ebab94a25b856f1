//! Per-scenario workspace paths.
//!
//! ```text
//! <output_root>/structured-output/<name>   output_dir
//! <output_root>/workdir/<name>             work_dir
//! <output_root>/download/<name>            download_dir
//! ```
//!
//! Paths are namespaced by scenario name so concurrent runs of distinct
//! scenarios never share a directory. Resolution is pure; nothing touches the
//! filesystem until [`Workspace::create`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

/// Subdirectory of the output root holding CLI output.
pub const OUTPUT_SUBDIR: &str = "structured-output";
/// Subdirectory of the output root holding CLI work state.
pub const WORK_SUBDIR: &str = "workdir";
/// Subdirectory of the output root holding downloaded source documents.
pub const DOWNLOAD_SUBDIR: &str = "download";
/// Default subdirectory of the output root holding golden fixtures.
pub const EXPECTED_SUBDIR: &str = "expected-structured-output";

/// The transient directories of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub name: String,
    pub output_root: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub download_dir: PathBuf,
}

impl Workspace {
    /// Compute the workspace for `name` under an absolute `output_root`.
    pub fn resolve(output_root: &Path, name: &str) -> Result<Self, WorkspaceError> {
        if !is_safe_component(name) {
            return Err(WorkspaceError::InvalidName {
                name: name.to_owned(),
            });
        }
        if !output_root.is_absolute() {
            return Err(WorkspaceError::UnresolvableRoot {
                path: output_root.display().to_string(),
                reason: "output root must be absolute".to_owned(),
            });
        }
        Ok(Self {
            name: name.to_owned(),
            output_root: output_root.to_path_buf(),
            output_dir: output_root.join(OUTPUT_SUBDIR).join(name),
            work_dir: output_root.join(WORK_SUBDIR).join(name),
            download_dir: output_root.join(DOWNLOAD_SUBDIR).join(name),
        })
    }

    /// Create all three directories.
    pub async fn create(&self) -> io::Result<()> {
        for dir in [&self.output_dir, &self.work_dir, &self.download_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Directories removed at the end of a run, given whether downloads are purged.
    pub fn transient_dirs(&self, purge_downloads: bool) -> Vec<&Path> {
        let mut dirs = vec![self.work_dir.as_path(), self.output_dir.as_path()];
        if purge_downloads {
            dirs.push(self.download_dir.as_path());
        }
        dirs
    }
}

/// Turn the configured output root into an absolute path.
///
/// A relative `configured` value, or no value at all, is taken relative to
/// `base_dir` (the directory holding the harness config).
pub fn resolve_output_root(
    configured: Option<&str>,
    base_dir: &Path,
) -> Result<PathBuf, WorkspaceError> {
    let candidate = match configured {
        Some(raw) if raw.trim().is_empty() => {
            return Err(WorkspaceError::UnresolvableRoot {
                path: raw.to_owned(),
                reason: "output root is empty".to_owned(),
            });
        }
        Some(raw) => PathBuf::from(raw),
        None => base_dir.to_path_buf(),
    };
    let absolute = if candidate.is_absolute() {
        candidate
    } else if base_dir.is_absolute() {
        base_dir.join(candidate)
    } else {
        let cwd = std::env::current_dir().map_err(|e| WorkspaceError::UnresolvableRoot {
            path: candidate.display().to_string(),
            reason: format!("cannot read current directory: {e}"),
        })?;
        cwd.join(base_dir).join(candidate)
    };
    if absolute.is_file() {
        return Err(WorkspaceError::UnresolvableRoot {
            path: absolute.display().to_string(),
            reason: "path is a file".to_owned(),
        });
    }
    Ok(absolute)
}

/// Whether `name` can be used as a single directory name.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// What happens to `download_dir` when a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadRetention {
    /// Always removed.
    Purge,
    /// Removed in continuous integration, kept for local debugging.
    #[default]
    PurgeInCi,
    /// Never removed.
    Keep,
}

impl DownloadRetention {
    /// Whether the download directory is removed for a run.
    pub fn purges(self, ci: bool) -> bool {
        match self {
            Self::Purge => true,
            Self::PurgeInCi => ci,
            Self::Keep => false,
        }
    }
}

impl fmt::Display for DownloadRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purge => write!(f, "purge"),
            Self::PurgeInCi => write!(f, "purge-in-ci"),
            Self::Keep => write!(f, "keep"),
        }
    }
}

impl std::str::FromStr for DownloadRetention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purge" => Ok(Self::Purge),
            "purge-in-ci" => Ok(Self::PurgeInCi),
            "keep" => Ok(Self::Keep),
            other => Err(format!(
                "unknown download retention '{other}', expected purge, purge-in-ci or keep"
            )),
        }
    }
}
