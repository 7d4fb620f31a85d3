//! Integration tests for completion watchers against a real directory.
//!
//! The HTTP tests run a minimal orchestrator on a local TCP port.

use async_trait::async_trait;
use conductor_daemon::{
    CompletionEvent, CompletionNotifier, CompletionWatcher, DaemonError, DaemonResult,
    HttpCompletionNotifier, TrackedProject, WatcherOptions, WatcherState, WatcherSupervisor,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Records every notification attempt; fails the first `fail_first` calls.
#[derive(Default)]
struct RecordingNotifier {
    attempts: Mutex<Vec<(CompletionEvent, bool)>>,
    fail_first: Mutex<usize>,
    /// Project whose notifications take this long to answer
    slow_project: Option<(i64, Duration)>,
}

impl RecordingNotifier {
    fn failing(n: usize) -> Self {
        Self {
            fail_first: Mutex::new(n),
            ..Self::default()
        }
    }

    fn slow_for(project_id: i64, delay: Duration) -> Self {
        Self {
            slow_project: Some((project_id, delay)),
            ..Self::default()
        }
    }

    fn delivered(&self) -> Vec<(i64, u64)> {
        self.attempts
            .lock()
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(e, _)| (e.project_id, e.task_id))
            .collect()
    }

    fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, event: &CompletionEvent) -> DaemonResult<()> {
        if let Some((project_id, delay)) = self.slow_project {
            if project_id == event.project_id {
                tokio::time::sleep(delay).await;
            }
        }
        let mut remaining = self.fail_first.lock();
        let ok = *remaining == 0;
        if !ok {
            *remaining -= 1;
        }
        self.attempts.lock().push((event.clone(), ok));
        if ok {
            Ok(())
        } else {
            Err(DaemonError::NotificationRejected {
                task_id: event.task_id,
                status: 503,
            })
        }
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

fn output_dir(root: &Path) -> std::path::PathBuf {
    root.join(".tasks/output")
}

fn start_watcher(
    root: &Path,
    notifier: Arc<dyn CompletionNotifier>,
    options: WatcherOptions,
) -> CompletionWatcher {
    let mut watcher = CompletionWatcher::new(&TrackedProject::new(1, root), notifier, options)
        .expect("project has a local path");
    watcher.start().expect("watcher should start");
    watcher
}

/// Minimal orchestrator: answers every POST with `status` and forwards the
/// request body.
async fn spawn_orchestrator(status: u16) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let body = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(split) = text.find("\r\n\r\n") {
                        let length = text[..split]
                            .lines()
                            .find_map(|l| {
                                let (k, v) = l.split_once(':')?;
                                k.eq_ignore_ascii_case("content-length")
                                    .then(|| v.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if buf.len() >= split + 4 + length {
                            break buf[split + 4..split + 4 + length].to_vec();
                        }
                    }
                };

                let _ = tx.send(serde_json::from_slice(&body).unwrap_or(Value::Null));
                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/api/tasks/complete", addr), rx)
}

#[tokio::test]
async fn test_result_file_triggers_exactly_one_notification() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier.clone(), WatcherOptions::default());

    std::fs::write(output_dir(dir.path()).join("task-7-result.md"), "# done\n").unwrap();

    assert!(wait_for(|| notifier.attempt_count() > 0, Duration::from_secs(5)).await);
    // Let any trailing write events for the same file arrive.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(notifier.delivered(), vec![(1, 7)]);

    watcher.stop().await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn test_non_matching_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier.clone(), WatcherOptions::default());

    let out = output_dir(dir.path());
    std::fs::write(out.join("notes.txt"), "scratch").unwrap();
    std::fs::write(out.join("task-abc-result.md"), "").unwrap();
    std::fs::write(out.join("task-0-result.md"), "").unwrap();
    std::fs::create_dir(out.join("nested")).unwrap();
    std::fs::write(out.join("nested/task-3-result.md"), "").unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(notifier.attempt_count(), 0);

    watcher.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier, WatcherOptions::default());

    assert!(matches!(watcher.start(), Err(DaemonError::InvalidState(1))));
    watcher.stop().await;
    assert!(watcher.start().is_err());
}

#[tokio::test]
async fn test_missing_directory_without_create_fails() {
    let dir = tempfile::tempdir().unwrap();
    let options = WatcherOptions {
        create_missing_dirs: false,
        ..WatcherOptions::default()
    };
    let mut watcher = CompletionWatcher::new(
        &TrackedProject::new(1, dir.path()),
        Arc::new(RecordingNotifier::default()),
        options,
    )
    .unwrap();

    assert!(matches!(watcher.start(), Err(DaemonError::WatchError { .. })));
    assert_eq!(watcher.state(), WatcherState::Idle);
}

#[tokio::test]
async fn test_removed_directory_makes_watcher_inert() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier, WatcherOptions::default());

    std::fs::remove_dir_all(output_dir(dir.path())).unwrap();

    assert!(wait_for(|| watcher.state() == WatcherState::Inert, Duration::from_secs(5)).await);
    watcher.stop().await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn test_http_notification_body() {
    let (endpoint, mut bodies) = spawn_orchestrator(200).await;
    let notifier = Arc::new(HttpCompletionNotifier::new(endpoint, Duration::from_secs(5)).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let mut watcher = start_watcher(dir.path(), notifier, WatcherOptions::default());
    std::fs::write(output_dir(dir.path()).join("task-7-result.md"), "ok").unwrap();

    let body = tokio::time::timeout(Duration::from_secs(5), bodies.recv())
        .await
        .expect("orchestrator should receive a POST")
        .unwrap();
    assert_eq!(body, json!({ "taskId": 7 }));

    watcher.stop().await;
}

#[tokio::test]
async fn test_rejected_notification_keeps_watching() {
    let (endpoint, mut bodies) = spawn_orchestrator(500).await;
    let notifier = Arc::new(HttpCompletionNotifier::new(endpoint, Duration::from_secs(5)).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let mut watcher = start_watcher(dir.path(), notifier, WatcherOptions::default());
    let out = output_dir(dir.path());

    std::fs::write(out.join("task-1-result.md"), "").unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), bodies.recv()).await.unwrap();
    assert_eq!(first, Some(json!({ "taskId": 1 })));

    std::fs::write(out.join("task-2-result.json"), "{}").unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), bodies.recv()).await.unwrap();
    assert_eq!(second, Some(json!({ "taskId": 2 })));

    assert!(
        wait_for(|| watcher.state() == WatcherState::Watching, Duration::from_secs(2)).await
    );
    watcher.stop().await;
}

#[tokio::test]
async fn test_reconcile_retries_failed_notification() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::failing(1));
    let options = WatcherOptions {
        reconcile_interval: Some(Duration::from_millis(300)),
        ..WatcherOptions::default()
    };
    let mut watcher = start_watcher(dir.path(), notifier.clone(), options);

    std::fs::write(output_dir(dir.path()).join("task-4-result.md"), "").unwrap();

    assert!(wait_for(|| !notifier.delivered().is_empty(), Duration::from_secs(5)).await);
    assert_eq!(notifier.delivered(), vec![(1, 4)]);

    // Once delivered, later scans leave it alone.
    let attempts = notifier.attempt_count();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(notifier.attempt_count(), attempts);

    watcher.stop().await;
}

#[tokio::test]
async fn test_reconcile_skips_files_present_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let out = output_dir(dir.path());
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("task-9-result.md"), "old").unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let options = WatcherOptions {
        reconcile_interval: Some(Duration::from_millis(200)),
        ..WatcherOptions::default()
    };
    let mut watcher = start_watcher(dir.path(), notifier.clone(), options);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(notifier.attempt_count(), 0);

    watcher.stop().await;
}

#[tokio::test]
async fn test_supervisor_isolates_projects() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let not_a_dir = a.path().join("plain-file");
    std::fs::write(&not_a_dir, "").unwrap();

    let projects = vec![
        TrackedProject::new(1, a.path()),
        TrackedProject::new(2, b.path()),
        TrackedProject {
            id: 3,
            name: None,
            local_path: None,
        },
        // output dir cannot be created under a regular file
        TrackedProject::new(4, &not_a_dir),
    ];

    let notifier = Arc::new(RecordingNotifier::default());
    let mut supervisor = WatcherSupervisor::new(notifier.clone(), WatcherOptions::default());
    assert_eq!(supervisor.start_all(&projects), 2);
    assert_eq!(supervisor.len(), 2);

    std::fs::write(output_dir(b.path()).join("task-12-result.txt"), "").unwrap();
    assert!(wait_for(|| !notifier.delivered().is_empty(), Duration::from_secs(5)).await);
    assert_eq!(notifier.delivered(), vec![(2, 12)]);

    supervisor.shutdown().await;
    assert!(supervisor
        .states()
        .iter()
        .all(|(_, state)| *state == WatcherState::Stopped));
}

#[tokio::test]
async fn test_rename_into_place_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier.clone(), WatcherOptions::default());

    let out = output_dir(dir.path());
    std::fs::write(out.join("upload.partial"), "# result\n").unwrap();
    std::fs::rename(out.join("upload.partial"), out.join("task-21-result.md")).unwrap();

    assert!(wait_for(|| notifier.attempt_count() > 0, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(notifier.delivered(), vec![(1, 21)]);

    watcher.stop().await;
}

#[tokio::test]
async fn test_separate_rewrite_notifies_again() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = start_watcher(dir.path(), notifier.clone(), WatcherOptions::default());
    let artifact = output_dir(dir.path()).join("task-30-result.md");

    std::fs::write(&artifact, "first").unwrap();
    assert!(wait_for(|| notifier.attempt_count() == 1, Duration::from_secs(5)).await);

    // Well past the quiet period
    tokio::time::sleep(Duration::from_millis(400)).await;
    std::fs::write(&artifact, "second").unwrap();
    assert!(wait_for(|| notifier.attempt_count() == 2, Duration::from_secs(5)).await);
    assert_eq!(notifier.delivered(), vec![(1, 30), (1, 30)]);

    watcher.stop().await;
}

#[tokio::test]
async fn test_shutdown_reports_artifact_written_just_before() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut supervisor = WatcherSupervisor::new(notifier.clone(), WatcherOptions::default());
    assert_eq!(supervisor.start_all(&[TrackedProject::new(1, dir.path())]), 1);

    std::fs::write(output_dir(dir.path()).join("task-5-result.md"), "").unwrap();
    supervisor.shutdown().await;

    assert_eq!(notifier.delivered(), vec![(1, 5)]);
}

#[tokio::test]
async fn test_shutdown_cancels_every_project_before_draining() {
    let slow = tempfile::tempdir().unwrap();
    let fast = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::slow_for(1, Duration::from_millis(1500)));

    let mut supervisor = WatcherSupervisor::new(notifier.clone(), WatcherOptions::default());
    let projects = [TrackedProject::new(1, slow.path()), TrackedProject::new(2, fast.path())];
    assert_eq!(supervisor.start_all(&projects), 2);

    // Project 1 is still notifying this one while the shutdown runs.
    std::fs::write(output_dir(slow.path()).join("task-1-result.md"), "").unwrap();
    let shutdown = tokio::spawn(async move {
        supervisor.shutdown().await;
        supervisor
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(output_dir(fast.path()).join("task-99-result.md"), "").unwrap();

    let supervisor = shutdown.await.unwrap();
    assert_eq!(notifier.delivered(), vec![(1, 1)]);
    assert!(supervisor
        .states()
        .iter()
        .all(|(_, state)| *state == WatcherState::Stopped));
}
