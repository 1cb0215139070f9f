//! Dependency - cycle 検証付きの edge 追加
//!
//! `from -> to` が cycle を作るのは、`to` から `from` に到達できるときだけ。
//! forward edges を 1 回だけ反復 DFS でたどるので、追加 1 回あたり O(V + E)。
//! 検証中にグラフは変更しない。

use tracing::{debug, instrument};

use super::store::{GraphStore, NodeIndex};
use crate::domain::{GraphError, GraphResult, TaskId};

impl GraphStore {
    /// Add a dependency: `to` is blocked by `from`.
    ///
    /// Example: add_dependency(a, b) means "B waits for A".
    ///
    /// Rejections leave the graph unchanged:
    /// - `SelfDependency` when `from == to`
    /// - `TaskNotFound` for an unknown endpoint
    /// - `DuplicateDependency` when the edge already exists
    /// - `CycleDetected` when `from` is reachable from `to`
    #[instrument(level = "debug", skip(self), fields(from = %from, to = %to))]
    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) -> GraphResult<()> {
        if from == to {
            return Err(GraphError::SelfDependency(from));
        }
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        if self.has_edge_at(from_idx, to_idx) {
            return Err(GraphError::DuplicateDependency { from, to });
        }

        if let Some(path) = self.find_path(to_idx, from_idx) {
            let path = path
                .into_iter()
                .map(|idx| self.id_at(idx))
                .collect::<GraphResult<Vec<_>>>()?;
            debug!(path_len = path.len(), "dependency rejected: cycle");
            return Err(GraphError::CycleDetected { from, to, path });
        }

        self.link(from_idx, to_idx);
        self.refresh_blocked(to_idx);
        debug!("dependency added");
        Ok(())
    }

    /// Would adding `from -> to` create a cycle? Unknown tasks answer `false`.
    pub fn would_create_cycle(&self, from: TaskId, to: TaskId) -> bool {
        if from == to {
            return true;
        }
        match (self.index_of(from), self.index_of(to)) {
            (Ok(from_idx), Ok(to_idx)) => self.find_path(to_idx, from_idx).is_some(),
            _ => false,
        }
    }

    /// Iterative DFS along forward edges. Returns the node path
    /// `start ..= target` if `target` is reachable.
    fn find_path(&self, start: NodeIndex, target: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut visited = vec![false; self.slot_count()];
        let mut prev: Vec<Option<NodeIndex>> = vec![None; self.slot_count()];
        let mut stack = vec![start];
        visited[start] = true;

        while let Some(current) = stack.pop() {
            if current == target {
                return Some(follow_path(start, target, &prev));
            }
            let Some(node) = self.node(current) else {
                continue;
            };
            for &next in &node.dependents {
                if !visited[next] {
                    visited[next] = true;
                    prev[next] = Some(current);
                    stack.push(next);
                }
            }
        }
        None
    }
}

/// Walk `prev` links back from `target` to `start`.
fn follow_path(start: NodeIndex, target: NodeIndex, prev: &[Option<NodeIndex>]) -> Vec<NodeIndex> {
    let mut path = vec![target];
    let mut current = target;
    while current != start {
        match prev.get(current).copied().flatten() {
            Some(p) => {
                path.push(p);
                current = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, Task};

    fn graph_with(n: u128) -> GraphStore {
        let mut graph = GraphStore::new();
        for i in 1..=n {
            graph
                .add_task(Task::new(
                    TaskId::from_u128(i),
                    ProjectId::from_u128(100),
                    format!("t{i}"),
                ))
                .unwrap();
        }
        graph
    }

    fn id(n: u128) -> TaskId {
        TaskId::from_u128(n)
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut graph = graph_with(1);
        assert_eq!(
            graph.add_dependency(id(1), id(1)),
            Err(GraphError::SelfDependency(id(1)))
        );
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let mut graph = graph_with(1);
        assert_eq!(
            graph.add_dependency(id(1), id(7)),
            Err(GraphError::TaskNotFound(id(7)))
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn duplicate_edge_is_rejected() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(1), id(2)).unwrap();
        assert_eq!(
            graph.add_dependency(id(1), id(2)),
            Err(GraphError::DuplicateDependency {
                from: id(1),
                to: id(2)
            })
        );
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn detect_simple_cycle() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(1), id(2)).unwrap();

        let err = graph.add_dependency(id(2), id(1)).unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                from: id(2),
                to: id(1),
                path: vec![id(1), id(2)],
            }
        );
    }

    #[test]
    fn detect_longer_cycle_and_leave_graph_unchanged() {
        let mut graph = graph_with(4);
        // 1 -> 2 -> 3 -> 4
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(2), id(3)).unwrap();
        graph.add_dependency(id(3), id(4)).unwrap();
        let edges_before = graph.edges();
        let statuses_before: Vec<_> = graph.tasks().iter().map(|t| t.status()).collect();

        let err = graph.add_dependency(id(4), id(2)).unwrap_err();
        match err {
            GraphError::CycleDetected { path, .. } => {
                assert_eq!(path, vec![id(2), id(3), id(4)]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }

        assert_eq!(graph.edges(), edges_before);
        let statuses_after: Vec<_> = graph.tasks().iter().map(|t| t.status()).collect();
        assert_eq!(statuses_after, statuses_before);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn dag_with_diamond_is_accepted() {
        let mut graph = graph_with(3);
        // Diamond: 1 -> 2 -> 3, 1 -> 3 (NOT a cycle)
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(2), id(3)).unwrap();
        graph.add_dependency(id(1), id(3)).unwrap();
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn complex_dag_with_cross_edges_is_accepted() {
        let mut graph = graph_with(5);
        //     1
        //    / \
        //   2   3
        //   |\ /|
        //   | X |
        //   |/ \|
        //   4   5
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(1), id(3)).unwrap();
        graph.add_dependency(id(2), id(4)).unwrap();
        graph.add_dependency(id(2), id(5)).unwrap();
        graph.add_dependency(id(3), id(4)).unwrap();
        graph.add_dependency(id(3), id(5)).unwrap();

        assert!(graph.would_create_cycle(id(5), id(1)));
        assert!(!graph.would_create_cycle(id(4), id(5)));
        graph.check_invariants().unwrap();
    }
}
