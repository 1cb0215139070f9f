//! Enrichment port - 外部 lookup/suggestion サービスの抽象化
//!
//! 外部サービスは不安定である前提。呼び出しは必ず circuit breaker 経由で行い、
//! 結果は cache に保存する（app::coordinator を参照）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::ByteSize;
use crate::domain::{Task, TaskId};

/// Data returned by the external lookup for a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub task_id: TaskId,
    pub payload: serde_json::Value,
}

impl ByteSize for Enrichment {
    fn byte_size(&self) -> usize {
        // ULID (16 bytes) + serialized payload
        16 + self.payload.byte_size()
    }
}

/// Failure reported by an enrichment source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("enrichment lookup failed: {0}")]
pub struct LookupError(pub String);

/// EnrichmentSource は外部サービスへの問い合わせ
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn lookup(&self, task: &Task) -> Result<Enrichment, LookupError>;
}
