/// Error types for the completion watcher daemon
use std::path::PathBuf;
use thiserror::Error;

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] conductor_core::ConfigError),

    /// Project registry snapshot could not be read or parsed
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// Directory watch could not be established or failed
    #[error("Watch error on {path}: {message}")]
    WatchError { path: PathBuf, message: String },

    /// Watcher was started twice or after shutdown
    #[error("Watcher for project {0} is not idle")]
    InvalidState(i64),

    /// HTTP client construction or transport failure
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Orchestrator answered with a non-2xx status
    #[error("Orchestrator rejected completion for task {task_id}: HTTP {status}")]
    NotificationRejected { task_id: u64, status: u16 },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DaemonError {
    pub fn watch(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        DaemonError::WatchError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
