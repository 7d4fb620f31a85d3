//! Tracked-project registry snapshot.
//!
//! The external registry exports projects as a JSON array of
//! `{ "id": 1, "localPath": "/abs/path", ... }`. The supervisor reads it once
//! at startup; a missing or unreadable snapshot degrades to no projects.

use crate::errors::{DaemonError, DaemonResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A project the supervisor may watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProject {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    /// Absent for projects that only exist remotely
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

impl TrackedProject {
    pub fn new(id: i64, local_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: None,
            local_path: Some(local_path.into()),
        }
    }

    /// `localPath/<output_subdir>`, if the project has a local path.
    pub fn output_dir(&self, output_subdir: &Path) -> Option<PathBuf> {
        self.local_path.as_ref().map(|p| p.join(output_subdir))
    }
}

/// Parse a snapshot. Unknown fields are ignored.
pub fn parse_snapshot(content: &str) -> DaemonResult<Vec<TrackedProject>> {
    serde_json::from_str(content).map_err(|e| DaemonError::RegistryError(e.to_string()))
}

/// Strict read of a snapshot file.
pub fn read_snapshot(path: &Path) -> DaemonResult<Vec<TrackedProject>> {
    let content = std::fs::read_to_string(path)?;
    parse_snapshot(&content)
}

/// Read the snapshot, logging and returning an empty set on any failure.
pub fn load_snapshot(path: Option<&Path>) -> Vec<TrackedProject> {
    let Some(path) = path else {
        warn!("No project registry configured; watching nothing");
        return Vec::new();
    };

    match read_snapshot(path) {
        Ok(projects) => {
            info!(
                count = projects.len(),
                "Loaded project registry from {}",
                path.display()
            );
            projects
        }
        Err(e) => {
            warn!(
                error = %e,
                "Could not load project registry from {}; continuing with no projects",
                path.display()
            );
            Vec::new()
        }
    }
}
