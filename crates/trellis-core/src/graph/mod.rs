//! Graph - タスク依存グラフ
//!
//! # 構成
//! - **store**: タスクノードの arena（forward / reverse の両方向 edge）
//! - **dependency**: 到達可能性チェック付きの edge 追加
//! - **order**: Kahn 法による topological order と ready set
//!
//! `GraphStore` 自体は同期化しない。`app::Coordinator` が RwLock の内側で保持する。

mod dependency;
mod order;
mod store;

pub use store::GraphStore;
