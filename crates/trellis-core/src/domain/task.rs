//! Task - ボード上のタスクと状態

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ProjectId, TaskId};

/// Board status of a task.
///
/// State transitions driven by the dependency graph:
/// - Pending <-> Blocked (recomputed whenever a blocker changes)
///
/// Everything else (Pending -> InProgress -> Done, reopen, ...) is driven by
/// the board through `set_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started, nothing blocking it.
    Pending,

    /// Currently being worked on.
    InProgress,

    /// Waiting for at least one blocker that is not done.
    Blocked,

    /// Completed.
    Done,
}

impl TaskStatus {
    /// Does the graph own this status (may rewrite it between Pending and Blocked)?
    pub fn is_waiting(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Blocked)
    }

    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        };
        f.write_str(s)
    }
}

/// A work item on the board (node of the dependency graph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    project: ProjectId,
    title: String,
    status: TaskStatus,
}

impl Task {
    /// New tasks always start as `Pending`.
    pub fn new(id: TaskId, project: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            project,
            title: title.into(),
            status: TaskStatus::Pending,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }
}
