//! Deferred run teardown.
//!
//! A [`CleanupGuard`] is created as soon as a run's paths are known and owns
//! the run's dependency service once one is provisioned. [`release`] stops
//! the service and removes the transient directories; it consumes the guard,
//! so teardown happens at most once.
//!
//! If the guard is dropped before `release` finishes (the run future was
//! dropped or a task panicked), `Drop` removes the directories synchronously
//! and stops the service. On a multi-thread runtime the stop blocks the
//! dropping thread until it completes. On a current-thread runtime it can
//! only be spawned, and is lost if the runtime shuts down first.
//!
//! [`release`]: CleanupGuard::release

use std::io;
use std::path::{Path, PathBuf};

use gantry_core::workspace::Workspace;
use gantry_service::DynService;
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

/// What teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Directories that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Directories kept by the retention policy.
    pub retained: Vec<PathBuf>,
    /// Name of the service whose stop was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scoped teardown for one run.
pub struct CleanupGuard {
    workspace: Workspace,
    purge_downloads: bool,
    service: Option<Box<dyn DynService>>,
    released: bool,
}

impl CleanupGuard {
    pub fn new(workspace: Workspace, purge_downloads: bool) -> Self {
        Self {
            workspace,
            purge_downloads,
            service: None,
            released: false,
        }
    }

    /// Hand the run's service to the guard before it is started.
    ///
    /// From here on the service is stopped exactly once, whether or not its
    /// start succeeds.
    pub fn attach_service(&mut self, service: Box<dyn DynService>) -> &mut dyn DynService {
        self.service.insert(service).as_mut()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn purges_downloads(&self) -> bool {
        self.purge_downloads
    }

    /// Stop the service, then remove the transient directories.
    ///
    /// Dropping this future part way leaves the rest to `Drop`.
    pub async fn release(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(service) = self.service.as_mut() {
            let name = service.name().to_owned();
            if let Err(e) = service.stop().await {
                warn!(service = %name, error = %e, "service stop failed");
                report.errors.push(e.to_string());
            }
            self.service = None;
            report.service = Some(name);
        }

        for dir in self.workspace.transient_dirs(self.purge_downloads) {
            match remove_dir(dir).await {
                Ok(true) => report.removed.push(dir.to_path_buf()),
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to remove directory");
                    report
                        .errors
                        .push(format!("remove {}: {e}", dir.display()));
                }
            }
        }

        if !self.purge_downloads && self.workspace.download_dir.exists() {
            report.retained.push(self.workspace.download_dir.clone());
        }
        self.released = true;

        info!(
            removed = report.removed.len(),
            retained = report.retained.len(),
            errors = report.errors.len(),
            "cleanup complete"
        );
        report
    }
}

/// `Ok(false)` when there was nothing to remove.
async fn remove_dir(dir: &Path) -> io::Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(path = %dir.display(), "removed");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            scenario = %self.workspace.name,
            "run ended without cleanup, tearing down from drop"
        );

        for dir in self.workspace.transient_dirs(self.purge_downloads) {
            if let Err(e) = std::fs::remove_dir_all(dir)
                && e.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %dir.display(), error = %e, "failed to remove directory");
            }
        }

        let Some(mut service) = self.service.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let result = tokio::task::block_in_place(|| handle.block_on(service.stop()));
                if let Err(e) = result {
                    warn!(service = service.name(), error = %e, "service stop failed");
                }
            }
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = service.stop().await {
                        warn!(service = service.name(), error = %e, "service stop failed");
                    }
                });
            }
            Err(_) => warn!(
                service = service.name(),
                "no async runtime available, service left running"
            ),
        }
    }
}
