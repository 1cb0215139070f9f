//! Coordinator - タスク依存グラフの操作窓口
//!
//! グラフ操作は RwLock で直列化し（書き込みは write lock、参照は read lock）、
//! 外部 lookup は circuit breaker 経由で呼び出して結果を cache に保存します。

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::status::GraphStatus;
use crate::cache::{CacheManager, CacheStats};
use crate::domain::{Dependency, GraphError, GraphResult, ProjectId, Task, TaskId, TaskStatus};
use crate::graph::GraphStore;
use crate::ports::{Enrichment, EnrichmentSource, IdGenerator, LookupError};
use crate::resilience::{BreakerError, BreakerRegistry, BreakerSnapshot};

/// Breaker operation id used for enrichment lookups.
pub const ENRICHMENT_OPERATION: &str = "enrichment";

pub type EnrichmentCache = CacheManager<TaskId, Enrichment>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Open circuit, timeout or lookup failure. Callers may fall back to
    /// working without enrichment.
    #[error(transparent)]
    Enrichment(#[from] BreakerError<LookupError>),

    #[error("no enrichment source configured")]
    EnrichmentDisabled,
}

/// What `remove_task` does with a task that still has dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalMode {
    /// Refuse with `TaskStillLinked`.
    #[default]
    Reject,
    /// Detach every edge first (unblocking former dependents), then remove.
    Cascade,
}

/// The one component that sees the graph, the breakers and the cache.
///
/// Built with `CoordinatorBuilder`; all collaborators are injected.
pub struct Coordinator {
    graph: RwLock<GraphStore>,
    ids: Arc<dyn IdGenerator>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<EnrichmentCache>,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
    enrichment_timeout: Duration,
}

impl Coordinator {
    pub(crate) fn new(
        ids: Arc<dyn IdGenerator>,
        breakers: Arc<BreakerRegistry>,
        cache: Arc<EnrichmentCache>,
        enrichment: Option<Arc<dyn EnrichmentSource>>,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            graph: RwLock::new(GraphStore::new()),
            ids,
            breakers,
            cache,
            enrichment,
            enrichment_timeout,
        }
    }

    // ---- tasks ----

    /// Create a pending task with a fresh id.
    pub async fn create_task(
        &self,
        project: ProjectId,
        title: impl Into<String>,
    ) -> GraphResult<TaskId> {
        let id = self.ids.generate_task_id();
        self.insert_task(Task::new(id, project, title)).await?;
        Ok(id)
    }

    /// Insert a task whose id is already known (e.g. loaded from the board).
    pub async fn insert_task(&self, task: Task) -> GraphResult<()> {
        let mut graph = self.graph.write().await;
        graph.add_task(task)
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.graph.read().await.task(id).cloned()
    }

    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> GraphResult<()> {
        let mut graph = self.graph.write().await;
        graph.set_status(id, status)?;
        debug!(task_id = %id, %status, "status updated");
        Ok(())
    }

    /// Remove a task. Returns the edges removed along with it (empty for
    /// `RemovalMode::Reject`). Either everything happens or nothing does.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn remove_task(&self, id: TaskId, mode: RemovalMode) -> GraphResult<Vec<Dependency>> {
        let removed = {
            let mut graph = self.graph.write().await;
            match mode {
                RemovalMode::Reject => {
                    graph.remove_task(id)?;
                    Vec::new()
                }
                RemovalMode::Cascade => {
                    // detach only fails for unknown ids, before touching anything
                    let removed = graph.detach_task(id)?;
                    graph.remove_task(id)?;
                    removed
                }
            }
        };
        self.cache.remove(&id);
        info!(detached = removed.len(), "task removed");
        Ok(removed)
    }

    // ---- dependencies ----

    /// `to` becomes blocked by `from`. Fails with `CycleDetected`,
    /// `TaskNotFound`, `SelfDependency` or `DuplicateDependency`; the graph is
    /// unchanged on failure.
    pub async fn add_dependency(&self, from: TaskId, to: TaskId) -> GraphResult<()> {
        let mut graph = self.graph.write().await;
        graph.add_dependency(from, to).inspect_err(|err| {
            debug!(from = %from, to = %to, error = %err, "dependency rejected");
        })
    }

    /// Fails with `DependencyNotFound` (also on a repeated call).
    pub async fn remove_dependency(&self, from: TaskId, to: TaskId) -> GraphResult<()> {
        let mut graph = self.graph.write().await;
        graph.remove_dependency(from, to)
    }

    pub async fn dependencies_of(&self, id: TaskId) -> GraphResult<Vec<TaskId>> {
        self.graph.read().await.dependencies_of(id)
    }

    pub async fn dependents_of(&self, id: TaskId) -> GraphResult<Vec<TaskId>> {
        self.graph.read().await.dependents_of(id)
    }

    pub async fn dependencies(&self) -> Vec<Dependency> {
        self.graph.read().await.edges()
    }

    // ---- queries ----

    pub async fn ready_tasks(&self) -> Vec<TaskId> {
        self.graph.read().await.ready_tasks()
    }

    pub async fn unlinked_tasks(&self) -> Vec<TaskId> {
        self.graph.read().await.unlinked_tasks()
    }

    pub async fn topological_order(&self) -> GraphResult<Vec<TaskId>> {
        self.graph.read().await.topological_order()
    }

    pub async fn status(&self) -> GraphStatus {
        GraphStatus::from_graph(&*self.graph.read().await)
    }

    /// Consistent copy of the whole graph.
    pub async fn snapshot(&self) -> GraphStore {
        self.graph.read().await.clone()
    }

    // ---- enrichment ----

    /// Enrichment data for a task: from the cache, or fetched through the
    /// enrichment breaker (with timeout) and cached.
    ///
    /// A cache that cannot store the result is skipped silently; breaker and
    /// lookup failures are returned so the caller can choose a fallback.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn enrich(&self, id: TaskId) -> Result<Enrichment, CoordinatorError> {
        if let Some(hit) = self.cache.get(&id) {
            debug!("enrichment cache hit");
            return Ok(hit);
        }

        let source = self
            .enrichment
            .as_ref()
            .ok_or(CoordinatorError::EnrichmentDisabled)?;
        // lookup runs without holding the graph lock
        let task = self.task(id).await.ok_or(GraphError::TaskNotFound(id))?;

        let enrichment = self
            .breakers
            .call_through_with_timeout(ENRICHMENT_OPERATION, self.enrichment_timeout, || {
                source.lookup(&task)
            })
            .await?;

        if let Err(err) = self.cache.put(id, enrichment.clone()) {
            debug!(error = %err, "enrichment not cached");
        }
        Ok(enrichment)
    }

    /// `enrich`, degrading every enrichment failure to `None`.
    pub async fn try_enrich(&self, id: TaskId) -> Option<Enrichment> {
        match self.enrich(id).await {
            Ok(enrichment) => Some(enrichment),
            Err(CoordinatorError::Enrichment(err)) if err.is_circuit_open() => {
                debug!(task_id = %id, "enrichment skipped: circuit open");
                None
            }
            Err(err) => {
                warn!(task_id = %id, error = %err, "enrichment unavailable");
                None
            }
        }
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
