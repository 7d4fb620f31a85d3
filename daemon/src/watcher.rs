//! Completion Watcher - one per tracked project
//!
//! Watches `<localPath>/.tasks/output` (non-recursive) for completion
//! artifacts named `task-<id>-result.<ext>` and notifies the orchestrator.
//!
//! Features:
//! - File-system watching using notify crate
//! - Debouncing so a create+write burst on one file yields one notification
//! - Optional periodic reconciliation scan for events the OS never delivered
//! - Fault isolation: a failed watch makes this watcher inert, nothing else

use crate::completion::CompletionEvent;
use crate::errors::{DaemonError, DaemonResult};
use crate::notifier::{deliver, CompletionNotifier, RetryPolicy};
use crate::registry::TrackedProject;
use conductor_core::WatcherConfig;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Notifying,
    /// The directory watch failed; no further events will be seen
    Inert,
    Stopped,
}

/// Watcher settings shared by every project.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub output_subdir: PathBuf,
    pub create_missing_dirs: bool,
    pub debounce: Duration,
    pub reconcile_interval: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}

impl WatcherOptions {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            output_subdir: config.output_subdir.clone(),
            create_missing_dirs: config.create_missing_dirs,
            debounce: Duration::from_millis(config.debounce_ms),
            reconcile_interval: config.reconcile_interval_secs.map(Duration::from_secs),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// Watches one project's output directory.
pub struct CompletionWatcher {
    project_id: i64,
    output_dir: PathBuf,
    notifier: Arc<dyn CompletionNotifier>,
    options: WatcherOptions,
    state: Arc<RwLock<WatcherState>>,

    /// File watcher handle (kept alive while watching)
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl CompletionWatcher {
    /// Fails if the project has no local path.
    pub fn new(
        project: &TrackedProject,
        notifier: Arc<dyn CompletionNotifier>,
        options: WatcherOptions,
    ) -> DaemonResult<Self> {
        let output_dir = project.output_dir(&options.output_subdir).ok_or_else(|| {
            DaemonError::RegistryError(format!("project {} has no local path", project.id))
        })?;

        Ok(Self {
            project_id: project.id,
            output_dir,
            notifier,
            options,
            state: Arc::new(RwLock::new(WatcherState::Idle)),
            watcher: None,
            shutdown_tx: None,
            task: None,
        })
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn state(&self) -> WatcherState {
        *self.state.read()
    }

    /// Subscribe to directory events and spawn the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> DaemonResult<()> {
        if self.state() != WatcherState::Idle {
            return Err(DaemonError::InvalidState(self.project_id));
        }

        if !self.output_dir.is_dir() {
            if self.options.create_missing_dirs {
                std::fs::create_dir_all(&self.output_dir)?;
                debug!(project_id = self.project_id, "Created {}", self.output_dir.display());
            } else {
                return Err(DaemonError::watch(&self.output_dir, "directory does not exist"));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| DaemonError::watch(&self.output_dir, e))?;

        watcher
            .watch(&self.output_dir, RecursiveMode::NonRecursive)
            .map_err(|e| DaemonError::watch(&self.output_dir, e))?;

        // Artifacts present before start were handled by a previous run. The
        // snapshot is taken after the watch is live so nothing falls between
        // the two; an artifact in both still notifies through its event.
        let seen = existing_task_ids(&self.output_dir)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let event_loop = EventLoop {
            project_id: self.project_id,
            output_dir: self.output_dir.clone(),
            notifier: self.notifier.clone(),
            retry: self.options.retry.clone(),
            debounce: self.options.debounce,
            state: self.state.clone(),
            seen,
            failed: HashSet::new(),
            pending: HashMap::new(),
        };
        let reconcile = self.options.reconcile_interval;

        *self.state.write() = WatcherState::Watching;
        self.task = Some(tokio::spawn(event_loop.run(rx, shutdown_rx, reconcile)));
        self.watcher = Some(watcher);
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            project_id = self.project_id,
            "Watching {}",
            self.output_dir.display()
        );
        Ok(())
    }

    /// Stop receiving directory events. Returns immediately; the event loop
    /// drains in the background until [`join`](Self::join) is awaited.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.watcher = None;
    }

    /// Wait for the event loop to finish draining.
    ///
    /// An in-flight notification is allowed to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(project_id = self.project_id, error = %e, "Watcher task ended abnormally");
            }
        }

        *self.state.write() = WatcherState::Stopped;
        debug!(project_id = self.project_id, "Watcher stopped");
    }

    /// Release the directory handle and wait for the event loop to drain.
    pub async fn stop(&mut self) {
        self.cancel();
        self.join().await;
    }
}

/// State owned by the spawned event loop.
struct EventLoop {
    project_id: i64,
    output_dir: PathBuf,
    notifier: Arc<dyn CompletionNotifier>,
    retry: RetryPolicy,
    debounce: Duration,
    state: Arc<RwLock<WatcherState>>,
    /// Task ids already observed (by event, scan, or at startup)
    seen: HashSet<u64>,
    /// Task ids whose last notification failed
    failed: HashSet<u64>,
    /// Artifacts waiting for their write burst to settle
    pending: HashMap<PathBuf, Instant>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown: watch::Receiver<bool>,
        reconcile_every: Option<Duration>,
    ) {
        let mut reconcile = reconcile_every.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let next_due = self.pending.values().min().map(|t| *t + self.debounce);

            tokio::select! {
                _ = shutdown.changed() => {
                    self.drain(&mut events).await;
                    break;
                }
                msg = events.recv() => match msg {
                    Some(Ok(event)) => {
                        if self.directory_removed(&event) {
                            error!(
                                project_id = self.project_id,
                                "Output directory {} was removed; watcher is now inert",
                                self.output_dir.display()
                            );
                            self.set_state(WatcherState::Inert);
                            break;
                        }
                        self.queue(&event);
                    }
                    Some(Err(e)) => {
                        error!(
                            project_id = self.project_id,
                            error = %e,
                            "Directory watch failed; watcher is now inert"
                        );
                        self.set_state(WatcherState::Inert);
                        break;
                    }
                    None => {
                        // Watcher handle dropped
                        self.drain(&mut events).await;
                        break;
                    }
                },
                _ = sleep_until(next_due) => self.flush_due().await,
                _ = tick(&mut reconcile) => self.reconcile(true).await,
            }
        }

        if !self.pending.is_empty() {
            warn!(
                project_id = self.project_id,
                dropped = self.pending.len(),
                "Watcher exited with unsent completions"
            );
        }
    }

    fn set_state(&self, state: WatcherState) {
        let mut current = self.state.write();
        if *current != WatcherState::Stopped {
            *current = state;
        }
    }

    fn directory_removed(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Remove(_))
            && (event.paths.iter().any(|p| p == &self.output_dir) || !self.output_dir.is_dir())
    }

    /// Record qualifying artifacts from one OS event.
    fn queue(&mut self, event: &Event) {
        for path in qualifying_paths(event) {
            match CompletionEvent::from_path(path, self.project_id) {
                Some(completion) => {
                    debug!(
                        project_id = self.project_id,
                        task_id = completion.task_id,
                        kind = ?event.kind,
                        "Completion artifact changed"
                    );
                    self.seen.insert(completion.task_id);
                    self.pending.insert(path.clone(), Instant::now());
                }
                None => debug!(path = %path.display(), "Ignoring non-artifact file"),
            }
        }
    }

    async fn flush_due(&mut self) {
        let now = Instant::now();
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| now >= **at + self.debounce)
            .map(|(p, _)| p.clone())
            .collect();
        due.sort();
        for path in due {
            self.pending.remove(&path);
            self.notify_path(&path).await;
        }
    }

    /// Report everything known at shutdown: events already delivered but
    /// not yet received, artifacts in their quiet period, and artifacts on
    /// disk that never produced an event.
    async fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<notify::Result<Event>>) {
        while let Ok(msg) = events.try_recv() {
            if let Ok(event) = msg {
                self.queue(&event);
            }
        }
        self.flush_all().await;
        self.reconcile(false).await;
    }

    async fn flush_all(&mut self) {
        let mut all: Vec<PathBuf> = self.pending.drain().map(|(p, _)| p).collect();
        all.sort();
        for path in all {
            self.notify_path(&path).await;
        }
    }

    async fn notify_path(&mut self, path: &Path) {
        if let Some(event) = CompletionEvent::from_path(path, self.project_id) {
            self.notify(event).await;
        }
    }

    async fn notify(&mut self, event: CompletionEvent) {
        self.set_state(WatcherState::Notifying);
        match deliver(self.notifier.as_ref(), &event, &self.retry).await {
            Ok(()) => {
                self.failed.remove(&event.task_id);
            }
            Err(e) => {
                error!(
                    project_id = self.project_id,
                    task_id = event.task_id,
                    error = %e,
                    "Failed to notify orchestrator of task completion"
                );
                self.failed.insert(event.task_id);
            }
        }
        self.set_state(WatcherState::Watching);
    }

    /// Notify artifacts that exist on disk but were never seen, and, with
    /// `retry_failed`, those whose last notification failed.
    async fn reconcile(&mut self, retry_failed: bool) {
        let ids = match existing_task_ids(&self.output_dir) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(project_id = self.project_id, error = %e, "Reconciliation scan failed");
                return;
            }
        };

        let mut missed: Vec<u64> = ids
            .into_iter()
            .filter(|id| !self.seen.contains(id) || (retry_failed && self.failed.contains(id)))
            .collect();
        missed.sort_unstable();

        if !missed.is_empty() {
            info!(
                project_id = self.project_id,
                count = missed.len(),
                "Reconciliation found unsent completions"
            );
        }
        for task_id in missed {
            self.seen.insert(task_id);
            self.notify(CompletionEvent::new(task_id, self.project_id)).await;
        }
    }
}

/// Paths of an event that may name a newly written artifact.
fn qualifying_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Metadata(_)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .last()
            .map(std::slice::from_ref)
            .unwrap_or(&[]),
        EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}

/// Task ids of every artifact currently in `dir`.
fn existing_task_ids(dir: &Path) -> std::io::Result<HashSet<u64>> {
    let mut ids = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(event) = CompletionEvent::from_path(&entry.path(), 0) {
            ids.insert(event.task_id);
        }
    }
    Ok(ids)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn test_qualifying_paths() {
        let create = event(EventKind::Create(CreateKind::File), &["/o/task-1-result.md"]);
        assert_eq!(qualifying_paths(&create).len(), 1);

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/o/task-1-result.md"],
        );
        assert_eq!(qualifying_paths(&write).len(), 1);

        let chmod = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/o/task-1-result.md"],
        );
        assert!(qualifying_paths(&chmod).is_empty());

        let rename = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/o/tmp123", "/o/task-1-result.md"],
        );
        assert_eq!(qualifying_paths(&rename), &[PathBuf::from("/o/task-1-result.md")]);

        let remove = event(
            EventKind::Remove(notify::event::RemoveKind::File),
            &["/o/task-1-result.md"],
        );
        assert!(qualifying_paths(&remove).is_empty());
    }

    #[test]
    fn test_existing_task_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task-3-result.md"), "").unwrap();
        std::fs::write(dir.path().join("task-x-result.md"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let ids = existing_task_ids(dir.path()).unwrap();
        assert_eq!(ids, HashSet::from([3]));
    }

    #[test]
    fn test_new_requires_local_path() {
        struct Never;
        #[async_trait::async_trait]
        impl CompletionNotifier for Never {
            async fn notify(&self, _: &CompletionEvent) -> DaemonResult<()> {
                Ok(())
            }
        }

        let project = TrackedProject {
            id: 1,
            name: None,
            local_path: None,
        };
        let watcher = CompletionWatcher::new(&project, Arc::new(Never), WatcherOptions::default());
        assert!(watcher.is_err());
    }

    #[derive(Default)]
    struct Recorder {
        task_ids: parking_lot::Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl CompletionNotifier for Recorder {
        async fn notify(&self, event: &CompletionEvent) -> DaemonResult<()> {
            self.task_ids.lock().push(event.task_id);
            Ok(())
        }
    }

    fn event_loop(dir: &Path, notifier: Arc<Recorder>, seen: HashSet<u64>) -> EventLoop {
        EventLoop {
            project_id: 1,
            output_dir: dir.to_path_buf(),
            notifier,
            retry: RetryPolicy::none(),
            debounce: Duration::from_millis(10),
            state: Arc::new(RwLock::new(WatcherState::Watching)),
            seen,
            failed: HashSet::new(),
            pending: HashMap::new(),
        }
    }

    fn created(path: PathBuf) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(path))
    }

    #[tokio::test]
    async fn test_event_for_snapshotted_artifact_still_notifies() {
        // Written after the watch went live but before the startup snapshot.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task-8-result.md");
        std::fs::write(&path, "").unwrap();

        let notifier = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let looped = event_loop(dir.path(), notifier.clone(), HashSet::from([8]));
        let task = tokio::spawn(looped.run(rx, shutdown_rx, None));

        tx.send(created(path)).unwrap();
        for _ in 0..200 {
            if !notifier.task_ids.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(*notifier.task_ids.lock(), vec![8]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_undelivered_events() {
        // The artifact is gone from disk, so only the queued event reports it.
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(created(dir.path().join("task-5-result.md"))).unwrap();
        shutdown_tx.send(true).unwrap();

        let looped = event_loop(dir.path(), notifier.clone(), HashSet::new());
        looped.run(rx, shutdown_rx, None).await;
        assert_eq!(*notifier.task_ids.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_shutdown_sweeps_unseen_artifacts_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task-2-result.md"), "").unwrap();
        std::fs::write(dir.path().join("task-3-result.md"), "").unwrap();

        let notifier = Arc::new(Recorder::default());
        let (_tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let looped = event_loop(dir.path(), notifier.clone(), HashSet::from([2]));
        looped.run(rx, shutdown_rx, None).await;
        assert_eq!(*notifier.task_ids.lock(), vec![3]);
    }
}
