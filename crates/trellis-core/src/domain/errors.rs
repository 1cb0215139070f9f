//! Errors - グラフ操作のエラー
//!
//! どの variant も想定内の型付き結果。拒否された変更はグラフに何も残さないので、
//! 呼び出し側は報告して先に進める。

use thiserror::Error;

use super::TaskId;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Adding `from -> to` would close a cycle. `path` runs from `to` back to `from`.
    #[error("dependency {from} -> {to} would create a cycle: {chain}", chain = format_path(.path))]
    CycleDetected {
        from: TaskId,
        to: TaskId,
        path: Vec<TaskId>,
    },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("dependency not found: {from} -> {to}")]
    DependencyNotFound { from: TaskId, to: TaskId },

    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("dependency already exists: {from} -> {to}")]
    DuplicateDependency { from: TaskId, to: TaskId },

    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// Tasks are never deleted while an edge still references them.
    #[error("task {task} still has {edges} dependency edge(s); detach it first")]
    TaskStillLinked { task: TaskId, edges: usize },

    /// The stored graph violates its own invariants. Never expected.
    #[error("graph is inconsistent: {0}")]
    Inconsistent(String),
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
