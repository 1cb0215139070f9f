//! Cache - メモリ上限付きキャッシュ
//!
//! - **LruCache**: 単一スレッド用の byte 上限付き LRU map
//! - **CacheManager**: mutex で保護し、統計を取る共有ラッパー
//! - **ByteSize**: 値が予算に対して何 byte として数えられるか

mod lru;
mod manager;
mod size;

pub use lru::LruCache;
pub use manager::{CacheManager, CacheStats};
pub use size::ByteSize;

use thiserror::Error;

/// Cache failures are never fatal to the caller: skip the cache and continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A single value is larger than the cache may hold; nothing was stored.
    #[error("value of {size} bytes exceeds cache limit of {limit} bytes")]
    Capacity { size: usize, limit: usize },

    /// The cache could not be used for this call (e.g. a poisoned lock).
    #[error("cache {namespace} is unavailable")]
    Unavailable { namespace: String },
}
