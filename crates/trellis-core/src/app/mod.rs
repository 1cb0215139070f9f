//! App - アプリケーション層
//!
//! graph / resilience / cache を組み合わせて、タスク依存グラフの操作を提供します。
//!
//! # 主要コンポーネント
//! - **CoordinatorBuilder**: Coordinator の構築とワイヤリング
//! - **Coordinator**: グラフ操作と enrichment の窓口
//! - **GraphStatus**: 状態ごとのタスク数

pub mod builder;
pub mod coordinator;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, CoordinatorBuilder, ENRICHMENT_CACHE_NAMESPACE};
pub use self::coordinator::{
    Coordinator, CoordinatorError, ENRICHMENT_OPERATION, EnrichmentCache, RemovalMode,
};
pub use self::status::GraphStatus;
