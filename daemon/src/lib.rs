/// Conductor Daemon: completion watchers for tracked projects
/// Detects task result files and notifies the orchestrator over HTTP
pub mod completion;
pub mod errors;
pub mod notifier;
pub mod registry;
pub mod supervisor;
pub mod watcher; // one notify-based watcher per project

// Re-export commonly used types
pub use completion::{parse_task_id, CompletionEvent};
pub use errors::{DaemonError, DaemonResult};
pub use notifier::{deliver, CompletionNotifier, HttpCompletionNotifier, RetryPolicy};
pub use registry::{load_snapshot, parse_snapshot, read_snapshot, TrackedProject};
pub use supervisor::{wait_for_shutdown_signal, WatcherSupervisor};
pub use watcher::{CompletionWatcher, WatcherOptions, WatcherState};

/// Daemon version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
