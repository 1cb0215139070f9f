//! Edge - 依存関係（`from` が終わるまで `to` は待つ）

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;

/// A dependency edge: `to` is blocked by `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub from: TaskId,
    pub to: TaskId,
}

impl Dependency {
    pub fn new(from: TaskId, to: TaskId) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
