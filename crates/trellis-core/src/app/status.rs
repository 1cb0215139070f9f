//! Status - グラフの集計ビュー

use serde::{Deserialize, Serialize};

use crate::domain::TaskStatus;
use crate::graph::GraphStore;

/// Task counts by status, plus the number of dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatus {
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub done: usize,
    pub dependencies: usize,
}

impl GraphStatus {
    pub fn from_graph(graph: &GraphStore) -> Self {
        let mut counts = GraphStatus {
            dependencies: graph.edge_count(),
            ..GraphStatus::default()
        };
        for task in graph.tasks() {
            match task.status() {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Blocked => counts.blocked += 1,
                TaskStatus::Done => counts.done += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.blocked + self.done
    }
}
