//! BreakerRegistry - operation id ごとの breaker

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{BreakerError, BreakerSnapshot, CircuitBreaker};
use crate::config::{BreakerConfig, ConfigError};
use crate::ports::{Clock, SystemClock};

/// Hands out one `CircuitBreaker` per operation id, all built from the same
/// config and clock.
///
/// The registry lock is held only to look up or create a breaker; calls run
/// against the breaker itself, so unrelated operations never wait on each
/// other.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Validates `config` once; every breaker handed out later shares it.
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_system_clock(config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// The breaker for `operation_id`, created Closed on first use.
    pub fn breaker(&self, operation_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(breaker) = breakers.get(operation_id) {
            return Arc::clone(breaker);
        }
        debug!(operation = operation_id, "creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::from_validated(
            operation_id,
            self.config.clone(),
            Arc::clone(&self.clock),
        ));
        breakers.insert(operation_id.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Run `f` through the breaker of `operation_id`.
    pub async fn call_through<F, Fut, T, E>(
        &self,
        operation_id: &str,
        f: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(operation_id).call(f).await
    }

    /// `call_through` with a caller-imposed timeout, reported as a failure.
    pub async fn call_through_with_timeout<F, Fut, T, E>(
        &self,
        operation_id: &str,
        timeout: Duration,
        f: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(operation_id).call_with_timeout(timeout, f).await
    }

    /// Snapshots of every breaker created so far, sorted by operation id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        snapshots
    }
}
