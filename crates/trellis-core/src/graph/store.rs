//! GraphStore - arena ベースのタスクグラフ
//!
//! # 設計
//! - ノードは `slots` に置き、`NodeIndex` で参照する（`index`: TaskId -> slot）
//! - Forward edges: node -> そのノードが block しているノード（`dependents`）
//! - Reverse edges: node -> そのノードが待っているノード（`blockers`）
//! - 不変条件: forward と reverse は常に一致し、空 slot を参照しない
//!
//! 削除した slot は `free` で再利用する。順序は slot 番号ではなく
//! 挿入順 `seq` だけで決まる。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::{Dependency, GraphError, GraphResult, Task, TaskId, TaskStatus};

pub(crate) type NodeIndex = usize;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) task: Task,

    /// Insertion sequence, the tie-break key for every ordered output.
    pub(crate) seq: u64,

    /// Forward edges: tasks blocked by this one.
    pub(crate) dependents: HashSet<NodeIndex>,

    /// Reverse edges: tasks this one waits for.
    pub(crate) blockers: HashSet<NodeIndex>,
}

impl Node {
    fn degree(&self) -> usize {
        self.dependents.len() + self.blockers.len()
    }
}

/// Task dependency graph. Pure data structure: no locking, no policy beyond
/// its own invariants (see `graph::dependency` for the acyclicity check).
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    slots: Vec<Option<Node>>,
    free: Vec<NodeIndex>,
    index: HashMap<TaskId, NodeIndex>,
    next_seq: u64,
    edge_count: usize,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.index
            .get(&id)
            .and_then(|&idx| self.node(idx))
            .map(|node| &node.task)
    }

    /// Insert a task. Its insertion sequence fixes its position among ties.
    pub fn add_task(&mut self, task: Task) -> GraphResult<()> {
        let id = task.id();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateTask(id));
        }

        let node = Node {
            task,
            seq: self.next_seq,
            dependents: HashSet::new(),
            blockers: HashSet::new(),
        };
        self.next_seq += 1;

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, idx);
        debug!(task_id = %id, "task added");
        Ok(())
    }

    /// Remove a task that has no incident edges.
    ///
    /// Tasks still referenced by an edge are rejected with `TaskStillLinked`;
    /// call `detach_task` first.
    pub fn remove_task(&mut self, id: TaskId) -> GraphResult<Task> {
        let idx = self.index_of(id)?;
        let degree = self.node_at(idx)?.degree();
        if degree > 0 {
            return Err(GraphError::TaskStillLinked {
                task: id,
                edges: degree,
            });
        }

        let node = self.slots[idx]
            .take()
            .ok_or_else(|| GraphError::Inconsistent(format!("empty slot for {id}")))?;
        self.index.remove(&id);
        self.free.push(idx);
        debug!(task_id = %id, "task removed");
        Ok(node.task)
    }

    /// Remove every edge touching `id`. Former dependents get their blocked
    /// status recomputed. Returns the removed edges in a stable order.
    pub fn detach_task(&mut self, id: TaskId) -> GraphResult<Vec<Dependency>> {
        let idx = self.index_of(id)?;
        let node = self.node_at(idx)?;
        let blockers = self.sorted_by_seq(node.blockers.iter().copied());
        let dependents = self.sorted_by_seq(node.dependents.iter().copied());

        let mut removed = Vec::with_capacity(blockers.len() + dependents.len());
        for blocker in blockers {
            self.unlink(blocker, idx);
            removed.push(Dependency::new(self.id_at(blocker)?, id));
        }
        for dependent in dependents {
            self.unlink(idx, dependent);
            removed.push(Dependency::new(id, self.id_at(dependent)?));
            self.refresh_blocked(dependent);
        }
        self.refresh_blocked(idx);

        debug!(task_id = %id, removed = removed.len(), "task detached");
        Ok(removed)
    }

    /// Remove the edge `from -> to`.
    pub fn remove_dependency(&mut self, from: TaskId, to: TaskId) -> GraphResult<()> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        if !self.has_edge_at(from_idx, to_idx) {
            return Err(GraphError::DependencyNotFound { from, to });
        }
        self.unlink(from_idx, to_idx);
        self.refresh_blocked(to_idx);
        debug!(from = %from, to = %to, "dependency removed");
        Ok(())
    }

    /// Change a task's status and recompute the blocked status of the tasks
    /// it blocks.
    pub fn set_status(&mut self, id: TaskId, status: TaskStatus) -> GraphResult<()> {
        let idx = self.index_of(id)?;
        let node = self.node_at_mut(idx)?;
        node.task.set_status(status);
        let dependents: Vec<NodeIndex> = node.dependents.iter().copied().collect();

        self.refresh_blocked(idx);
        for dependent in dependents {
            self.refresh_blocked(dependent);
        }
        Ok(())
    }

    pub fn has_dependency(&self, from: TaskId, to: TaskId) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&from_idx), Some(&to_idx)) => self.has_edge_at(from_idx, to_idx),
            _ => false,
        }
    }

    /// Tasks that `id` waits for, in insertion order.
    pub fn dependencies_of(&self, id: TaskId) -> GraphResult<Vec<TaskId>> {
        let node = self.node_at(self.index_of(id)?)?;
        self.ids_by_seq(node.blockers.iter().copied())
    }

    /// Tasks waiting for `id`, in insertion order.
    pub fn dependents_of(&self, id: TaskId) -> GraphResult<Vec<TaskId>> {
        let node = self.node_at(self.index_of(id)?)?;
        self.ids_by_seq(node.dependents.iter().copied())
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.nodes_by_seq().into_iter().map(|(_, n)| &n.task).collect()
    }

    /// Snapshot of the edge set, ordered by (from seq, to seq).
    pub fn edges(&self) -> Vec<Dependency> {
        let mut edges = Vec::with_capacity(self.edge_count);
        for (_, node) in self.nodes_by_seq() {
            let mut targets: Vec<&Node> = node
                .dependents
                .iter()
                .filter_map(|&idx| self.node(idx))
                .collect();
            targets.sort_by_key(|n| n.seq);
            edges.extend(
                targets
                    .into_iter()
                    .map(|target| Dependency::new(node.task.id(), target.task.id())),
            );
        }
        edges
    }

    /// Verify forward/reverse edge symmetry, the edge counter and the id index.
    pub fn check_invariants(&self) -> GraphResult<()> {
        let mut forward = 0;
        for (idx, node) in self.live_nodes() {
            if self.index.get(&node.task.id()) != Some(&idx) {
                return Err(GraphError::Inconsistent(format!(
                    "index does not point at {}",
                    node.task.id()
                )));
            }
            for &dependent in &node.dependents {
                let linked = self
                    .node(dependent)
                    .is_some_and(|d| d.blockers.contains(&idx));
                if !linked {
                    return Err(GraphError::Inconsistent(format!(
                        "forward edge from {} has no reverse edge",
                        node.task.id()
                    )));
                }
            }
            for &blocker in &node.blockers {
                let linked = self
                    .node(blocker)
                    .is_some_and(|b| b.dependents.contains(&idx));
                if !linked {
                    return Err(GraphError::Inconsistent(format!(
                        "reverse edge into {} has no forward edge",
                        node.task.id()
                    )));
                }
            }
            forward += node.dependents.len();
        }
        if forward != self.edge_count {
            return Err(GraphError::Inconsistent(format!(
                "edge counter {} but {forward} edges stored",
                self.edge_count
            )));
        }
        Ok(())
    }

    // ---- crate-internal helpers (used by dependency / order) ----

    pub(crate) fn index_of(&self, id: TaskId) -> GraphResult<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(GraphError::TaskNotFound(id))
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub(crate) fn node_at(&self, idx: NodeIndex) -> GraphResult<&Node> {
        self.node(idx)
            .ok_or_else(|| GraphError::Inconsistent(format!("dangling node index {idx}")))
    }

    fn node_at_mut(&mut self, idx: NodeIndex) -> GraphResult<&mut Node> {
        self.slots
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| GraphError::Inconsistent(format!("dangling node index {idx}")))
    }

    pub(crate) fn id_at(&self, idx: NodeIndex) -> GraphResult<TaskId> {
        self.node_at(idx).map(|n| n.task.id())
    }

    /// Upper bound (exclusive) of node indices, for index-addressed scratch buffers.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live_nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|node| (idx, node)))
    }

    pub(crate) fn nodes_by_seq(&self) -> Vec<(NodeIndex, &Node)> {
        let mut nodes: Vec<_> = self.live_nodes().collect();
        nodes.sort_by_key(|(_, node)| node.seq);
        nodes
    }

    pub(crate) fn has_edge_at(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.node(from)
            .is_some_and(|node| node.dependents.contains(&to))
    }

    /// Commit `from -> to` without validation. Callers check cycles first.
    pub(crate) fn link(&mut self, from: NodeIndex, to: NodeIndex) {
        let inserted = match self.slots.get_mut(from).and_then(Option::as_mut) {
            Some(node) => node.dependents.insert(to),
            None => false,
        };
        if let Some(node) = self.slots.get_mut(to).and_then(Option::as_mut) {
            node.blockers.insert(from);
        }
        if inserted {
            self.edge_count += 1;
        }
    }

    fn unlink(&mut self, from: NodeIndex, to: NodeIndex) {
        let removed = match self.slots.get_mut(from).and_then(Option::as_mut) {
            Some(node) => node.dependents.remove(&to),
            None => false,
        };
        if let Some(node) = self.slots.get_mut(to).and_then(Option::as_mut) {
            node.blockers.remove(&from);
        }
        if removed {
            self.edge_count -= 1;
        }
    }

    /// Pending <-> Blocked, depending on whether every blocker is done.
    /// InProgress and Done are left alone.
    pub(crate) fn refresh_blocked(&mut self, idx: NodeIndex) {
        let Some(node) = self.node(idx) else {
            return;
        };
        if !node.task.status().is_waiting() {
            return;
        }
        let waiting_on_open = node
            .blockers
            .iter()
            .any(|&b| self.node(b).is_some_and(|n| !n.task.status().is_done()));
        let status = if waiting_on_open {
            TaskStatus::Blocked
        } else {
            TaskStatus::Pending
        };
        if let Some(node) = self.slots.get_mut(idx).and_then(Option::as_mut) {
            node.task.set_status(status);
        }
    }

    fn sorted_by_seq(&self, indices: impl Iterator<Item = NodeIndex>) -> Vec<NodeIndex> {
        let mut indices: Vec<NodeIndex> = indices.collect();
        indices.sort_by_key(|&idx| self.node(idx).map_or(u64::MAX, |n| n.seq));
        indices
    }

    fn ids_by_seq(&self, indices: impl Iterator<Item = NodeIndex>) -> GraphResult<Vec<TaskId>> {
        self.sorted_by_seq(indices)
            .into_iter()
            .map(|idx| self.id_at(idx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectId;

    fn task(n: u128) -> Task {
        Task::new(TaskId::from_u128(n), ProjectId::from_u128(100), format!("t{n}"))
    }

    fn id(n: u128) -> TaskId {
        TaskId::from_u128(n)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = GraphStore::new();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.task(id(1)).is_none());
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        assert_eq!(
            graph.add_task(task(1)),
            Err(GraphError::DuplicateTask(id(1)))
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn add_dependency_creates_forward_and_reverse_edges() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();

        graph.add_dependency(id(1), id(2)).unwrap(); // 2 waits for 1

        assert_eq!(graph.dependents_of(id(1)).unwrap(), vec![id(2)]);
        assert_eq!(graph.dependencies_of(id(2)).unwrap(), vec![id(1)]);
        assert!(graph.dependencies_of(id(1)).unwrap().is_empty());
        assert_eq!(graph.edge_count(), 1);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn remove_dependency_removes_both_edges() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();
        graph.add_dependency(id(1), id(2)).unwrap();

        graph.remove_dependency(id(1), id(2)).unwrap();

        assert!(graph.dependencies_of(id(2)).unwrap().is_empty());
        assert!(graph.dependents_of(id(1)).unwrap().is_empty());
        assert_eq!(graph.edge_count(), 0);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn removing_a_dependency_twice_reports_not_found() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.remove_dependency(id(1), id(2)).unwrap();
        let before = graph.edges();

        assert_eq!(
            graph.remove_dependency(id(1), id(2)),
            Err(GraphError::DependencyNotFound {
                from: id(1),
                to: id(2)
            })
        );
        assert_eq!(graph.edges(), before);
    }

    #[test]
    fn adding_a_blocker_marks_dependent_blocked() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();

        graph.add_dependency(id(1), id(2)).unwrap();
        assert_eq!(graph.task(id(2)).unwrap().status(), TaskStatus::Blocked);

        graph.set_status(id(1), TaskStatus::Done).unwrap();
        assert_eq!(graph.task(id(2)).unwrap().status(), TaskStatus::Pending);

        // reopening the blocker blocks the dependent again
        graph.set_status(id(1), TaskStatus::InProgress).unwrap();
        assert_eq!(graph.task(id(2)).unwrap().status(), TaskStatus::Blocked);
    }

    #[test]
    fn in_progress_dependent_is_not_rewritten() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();
        graph.set_status(id(2), TaskStatus::InProgress).unwrap();

        graph.add_dependency(id(1), id(2)).unwrap();
        assert_eq!(graph.task(id(2)).unwrap().status(), TaskStatus::InProgress);
    }

    #[test]
    fn linked_task_cannot_be_removed() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();
        graph.add_dependency(id(1), id(2)).unwrap();

        assert_eq!(
            graph.remove_task(id(1)),
            Err(GraphError::TaskStillLinked {
                task: id(1),
                edges: 1
            })
        );
        assert!(graph.contains(id(1)));
    }

    #[test]
    fn detach_unblocks_dependents_then_remove_succeeds() {
        let mut graph = GraphStore::new();
        for n in 1..=4 {
            graph.add_task(task(n)).unwrap();
        }
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(2), id(3)).unwrap();
        graph.add_dependency(id(2), id(4)).unwrap();
        assert_eq!(graph.task(id(3)).unwrap().status(), TaskStatus::Blocked);

        let removed = graph.detach_task(id(2)).unwrap();
        assert_eq!(
            removed,
            vec![
                Dependency::new(id(1), id(2)),
                Dependency::new(id(2), id(3)),
                Dependency::new(id(2), id(4)),
            ]
        );
        assert_eq!(graph.task(id(3)).unwrap().status(), TaskStatus::Pending);
        assert_eq!(graph.task(id(4)).unwrap().status(), TaskStatus::Pending);

        let removed_task = graph.remove_task(id(2)).unwrap();
        assert_eq!(removed_task.id(), id(2));
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 0);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn recycled_slots_keep_insertion_order() {
        let mut graph = GraphStore::new();
        graph.add_task(task(1)).unwrap();
        graph.add_task(task(2)).unwrap();
        graph.remove_task(id(1)).unwrap();
        graph.add_task(task(3)).unwrap(); // reuses slot 0

        let ids: Vec<TaskId> = graph.tasks().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![id(2), id(3)]);
    }
}
