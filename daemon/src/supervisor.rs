//! Owns one completion watcher per tracked project.

use crate::errors::DaemonResult;
use crate::notifier::CompletionNotifier;
use crate::registry::TrackedProject;
use crate::watcher::{CompletionWatcher, WatcherOptions, WatcherState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Starts, tracks and stops the per-project watchers.
///
/// A project that cannot be watched is logged and skipped; the others keep
/// running.
pub struct WatcherSupervisor {
    notifier: Arc<dyn CompletionNotifier>,
    options: WatcherOptions,
    watchers: Vec<CompletionWatcher>,
}

impl WatcherSupervisor {
    pub fn new(notifier: Arc<dyn CompletionNotifier>, options: WatcherOptions) -> Self {
        Self {
            notifier,
            options,
            watchers: Vec::new(),
        }
    }

    /// Start a watcher for every project with a local path.
    ///
    /// Returns the number of watchers that started.
    pub fn start_all(&mut self, projects: &[TrackedProject]) -> usize {
        let mut started = 0;
        for project in projects {
            if project.local_path.is_none() {
                info!(project_id = project.id, "Project has no local path; not watching");
                continue;
            }
            if self.watchers.iter().any(|w| w.project_id() == project.id) {
                warn!(project_id = project.id, "Project listed twice in registry; skipping");
                continue;
            }
            match self.start_one(project) {
                Ok(watcher) => {
                    self.watchers.push(watcher);
                    started += 1;
                }
                Err(e) => error!(
                    project_id = project.id,
                    error = %e,
                    "Failed to start completion watcher"
                ),
            }
        }

        info!(
            started,
            tracked = projects.len(),
            "Completion watchers running"
        );
        started
    }

    fn start_one(&self, project: &TrackedProject) -> DaemonResult<CompletionWatcher> {
        let mut watcher =
            CompletionWatcher::new(project, self.notifier.clone(), self.options.clone())?;
        watcher.start()?;
        Ok(watcher)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// `(project id, state)` for every watcher.
    pub fn states(&self) -> Vec<(i64, WatcherState)> {
        self.watchers
            .iter()
            .map(|w| (w.project_id(), w.state()))
            .collect()
    }

    /// Stop every watcher.
    ///
    /// All directory subscriptions are cancelled before any watcher is
    /// drained, so no project keeps watching while another finishes its
    /// in-flight notifications.
    pub async fn shutdown(&mut self) {
        info!(count = self.watchers.len(), "Stopping completion watchers");
        for watcher in self.watchers.iter_mut() {
            watcher.cancel();
        }
        for watcher in self.watchers.iter_mut() {
            watcher.join().await;
        }
    }

    /// Block until CTRL+C or SIGTERM, then shut down.
    pub async fn run_until_signal(&mut self) -> DaemonResult<()> {
        wait_for_shutdown_signal().await?;
        self.shutdown().await;
        Ok(())
    }
}

/// Resolve on the first CTRL+C or SIGTERM.
pub async fn wait_for_shutdown_signal() -> DaemonResult<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received CTRL+C signal");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received CTRL+C signal");
    }

    Ok(())
}
