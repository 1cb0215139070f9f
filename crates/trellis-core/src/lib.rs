//! trellis-core
//!
//! Task dependency orchestration core.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, edge, errors）
//! - **graph**: 依存グラフ（arena store, cycle-checked edges, topological order, ready set）
//! - **resilience**: 外部呼び出し用の circuit breaker と registry
//! - **cache**: byte 上限付き LRU cache
//! - **config**: TOML 設定
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, EnrichmentSource）
//! - **app**: Coordinator と CoordinatorBuilder

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod graph;
pub mod ports;
pub mod resilience;

pub use app::{Coordinator, CoordinatorBuilder, CoordinatorError, GraphStatus, RemovalMode};
pub use config::TrellisConfig;
pub use domain::{Dependency, GraphError, GraphResult, ProjectId, Task, TaskId, TaskStatus};
pub use graph::GraphStore;
