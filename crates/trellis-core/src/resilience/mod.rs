//! Resilience - 不安定な外部呼び出しの障害隔離
//!
//! - **CircuitBreaker**: 1 種類の操作を守る 3 状態の breaker
//! - **BreakerRegistry**: operation id ごとに breaker を必要時に生成

mod breaker;
mod registry;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;

use std::time::Duration;

use thiserror::Error;

/// Outcome of a call made through a breaker.
///
/// `CircuitOpen` and `Timeout` are produced by the breaker itself; `Inner`
/// carries the wrapped operation's own error. The breaker never retries.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Fast-fail: the operation was not invoked.
    #[error("circuit for {operation} is open (retry after {retry_after:?})")]
    CircuitOpen {
        operation: String,
        retry_after: Duration,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BreakerError::CircuitOpen { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(err) => Some(err),
            _ => None,
        }
    }
}
