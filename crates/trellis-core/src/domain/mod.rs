//! Domain - ドメインモデル（ids, task, edge, errors）

pub mod edge;
pub mod errors;
pub mod ids;
pub mod task;

pub use edge::Dependency;
pub use errors::{GraphError, GraphResult};
pub use ids::{ProjectId, TaskId};
pub use task::{Task, TaskStatus};
