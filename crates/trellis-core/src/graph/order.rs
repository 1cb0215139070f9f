//! Order - topological order と ready set の計算

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::instrument;

use super::store::GraphStore;
use crate::domain::{GraphError, GraphResult, TaskId};

impl GraphStore {
    /// One valid linearization of all tasks (Kahn's algorithm).
    ///
    /// Every blocker appears before the tasks it blocks. Among tasks that are
    /// ready at the same time, the one inserted first comes first, so the
    /// result is fully determined by insertion order and the edge set.
    #[instrument(level = "debug", skip_all, fields(tasks = self.len(), edges = self.edge_count()))]
    pub fn topological_order(&self) -> GraphResult<Vec<TaskId>> {
        let mut in_degree = vec![0usize; self.slot_count()];
        // Min-heap on (seq, index)
        let mut frontier = BinaryHeap::new();

        for (idx, node) in self.live_nodes() {
            in_degree[idx] = node.blockers.len();
            if node.blockers.is_empty() {
                frontier.push(Reverse((node.seq, idx)));
            }
        }

        let mut sorted = Vec::with_capacity(self.len());
        while let Some(Reverse((_, idx))) = frontier.pop() {
            let node = self.node_at(idx)?;
            sorted.push(node.task.id());

            for &dependent in &node.dependents {
                let degree = &mut in_degree[dependent];
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    let seq = self.node_at(dependent)?.seq;
                    frontier.push(Reverse((seq, dependent)));
                }
            }
        }

        if sorted.len() != self.len() {
            return Err(GraphError::Inconsistent(format!(
                "topological order reached {} of {} tasks",
                sorted.len(),
                self.len()
            )));
        }
        Ok(sorted)
    }

    /// Tasks that can start now, in insertion order.
    ///
    /// A task is ready when it takes part in the dependency graph (has at
    /// least one edge), is still waiting (pending or blocked), and every task
    /// blocking it is done. Tasks without any edge are reported by
    /// `unlinked_tasks` instead.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.nodes_by_seq()
            .into_iter()
            .filter(|(_, node)| {
                let linked = !node.blockers.is_empty() || !node.dependents.is_empty();
                linked
                    && node.task.status().is_waiting()
                    && node.blockers.iter().all(|&b| {
                        self.node(b)
                            .is_some_and(|blocker| blocker.task.status().is_done())
                    })
            })
            .map(|(_, node)| node.task.id())
            .collect()
    }

    /// Tasks with no incident edge, in insertion order.
    pub fn unlinked_tasks(&self) -> Vec<TaskId> {
        self.nodes_by_seq()
            .into_iter()
            .filter(|(_, node)| node.blockers.is_empty() && node.dependents.is_empty())
            .map(|(_, node)| node.task.id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, Task, TaskStatus};
    use std::time::{Duration, Instant};

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

    fn position(order: &[TaskId], task: TaskId) -> usize {
        order.iter().position(|t| *t == task).unwrap()
    }

    #[test]
    fn empty_graph_has_empty_order() {
        assert!(GraphStore::new().topological_order().unwrap().is_empty());
    }

    #[test]
    fn ties_follow_insertion_order() {
        let graph = graph_with(4);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![id(1), id(2), id(3), id(4)]
        );
    }

    #[test]
    fn order_is_pinned_for_a_mixed_graph() {
        let mut graph = graph_with(5);
        // 4 -> 1, 3 -> 2, 5 is free
        graph.add_dependency(id(4), id(1)).unwrap();
        graph.add_dependency(id(3), id(2)).unwrap();

        // frontier starts {3, 4, 5}; 3 goes first and releases 2, and so on
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![id(3), id(2), id(4), id(1), id(5)]
        );
    }

    #[test]
    fn every_edge_points_forward() {
        let mut graph = graph_with(6);
        let edges = [(1, 2), (1, 3), (2, 4), (3, 4), (4, 5), (6, 5), (6, 1)];
        for (from, to) in edges {
            graph.add_dependency(id(from), id(to)).unwrap();
        }

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 6);
        for (from, to) in edges {
            assert!(position(&order, id(from)) < position(&order, id(to)));
        }
    }

    #[test]
    fn ready_tasks_follow_completion() {
        let mut graph = graph_with(5);
        // T1 -> T2, T2 -> T3, T1 -> T4; T5 has no edges
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(2), id(3)).unwrap();
        graph.add_dependency(id(1), id(4)).unwrap();
        assert!(graph.add_dependency(id(3), id(1)).is_err());

        assert_eq!(graph.ready_tasks(), vec![id(1)]);
        assert_eq!(graph.unlinked_tasks(), vec![id(5)]);

        graph.set_status(id(1), TaskStatus::Done).unwrap();
        assert_eq!(graph.ready_tasks(), vec![id(2), id(4)]);

        graph.set_status(id(2), TaskStatus::InProgress).unwrap();
        assert_eq!(graph.ready_tasks(), vec![id(4)]);
    }

    #[test]
    fn thousand_task_chain_stays_within_budget() {
        let n = 1_000;
        let mut graph = graph_with(n);
        for i in 1..n {
            graph.add_dependency(id(i), id(i + 1)).unwrap();
        }
        // a few fan-out edges on top of the chain
        for i in (1..n - 10).step_by(7) {
            graph.add_dependency(id(i), id(i + 10)).unwrap();
        }

        // worst case for the cycle check: the whole chain is traversed
        let started = Instant::now();
        let rejected = graph.add_dependency(id(n), id(1));
        let insert_elapsed = started.elapsed();
        assert!(matches!(rejected, Err(GraphError::CycleDetected { .. })));

        let started = Instant::now();
        let order = graph.topological_order().unwrap();
        let order_elapsed = started.elapsed();

        assert_eq!(order.len(), 1_000);
        assert_eq!(order.first(), Some(&id(1)));
        assert_eq!(order.last(), Some(&id(n)));
        assert!(insert_elapsed < Duration::from_millis(50), "{insert_elapsed:?}");
        assert!(order_elapsed < Duration::from_millis(50), "{order_elapsed:?}");
    }
}
