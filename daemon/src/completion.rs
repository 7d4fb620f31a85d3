//! Completion artifacts and the events derived from them.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `task-<digits>-result.<ext>`, anchored on both ends.
static COMPLETION_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^task-([0-9]+)-result\.[A-Za-z0-9]+$").expect("static regex is valid")
});

/// A task observed as finished. Never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub task_id: u64,
    pub project_id: i64,
    pub detected_at: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn new(task_id: u64, project_id: i64) -> Self {
        Self {
            task_id,
            project_id,
            detected_at: Utc::now(),
        }
    }

    /// Build an event from an artifact path, if its file name qualifies.
    pub fn from_path(path: &Path, project_id: i64) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        parse_task_id(name).map(|task_id| Self::new(task_id, project_id))
    }
}

/// Extract the task id from a completion artifact file name.
///
/// Leading zeros are accepted. Zero and ids that overflow `u64` are not
/// valid task ids.
pub fn parse_task_id(file_name: &str) -> Option<u64> {
    let caps = COMPLETION_FILE.captures(file_name)?;
    let id: u64 = caps.get(1)?.as_str().parse().ok()?;
    (id > 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_matching_names() {
        assert_eq!(parse_task_id("task-42-result.md"), Some(42));
        assert_eq!(parse_task_id("task-7-result.txt"), Some(7));
        assert_eq!(parse_task_id("task-007-result.md"), Some(7));
        assert_eq!(parse_task_id("task-123456789-result.json"), Some(123456789));
    }

    #[test]
    fn test_non_matching_names() {
        for name in [
            "task-abc-result.md",
            "result-42.md",
            "task-42-result",
            "task-42-result.",
            "task--result.md",
            "task-42-results.md",
            "xtask-42-result.md",
            "task-42-result.md.swp",
            "task-4 2-result.md",
            "task-+42-result.md",
            "notes.txt",
            "",
        ] {
            assert_eq!(parse_task_id(name), None, "{} must not match", name);
        }
    }

    #[test]
    fn test_zero_and_overflow_rejected() {
        assert_eq!(parse_task_id("task-0-result.md"), None);
        assert_eq!(parse_task_id("task-000-result.md"), None);
        assert_eq!(parse_task_id("task-99999999999999999999999-result.md"), None);
    }

    #[test]
    fn test_event_from_path() {
        let path = PathBuf::from("/proj/.tasks/output/task-9-result.md");
        let event = CompletionEvent::from_path(&path, 4).unwrap();
        assert_eq!(event.task_id, 9);
        assert_eq!(event.project_id, 4);

        assert!(CompletionEvent::from_path(Path::new("/proj/.tasks/output/"), 4).is_none());
    }
}
