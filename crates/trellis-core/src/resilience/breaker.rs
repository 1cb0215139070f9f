//! CircuitBreaker - 1 つの操作を守る circuit breaker
//!
//! # 状態遷移
//! - Closed -> Open: `failure_threshold` 回連続で失敗
//! - Open -> HalfOpen: `recovery_timeout` 経過後の最初の呼び出し
//! - HalfOpen -> Closed: probe が `half_open_max_calls` 回成功
//! - HalfOpen -> Open: probe が 1 回でも失敗
//!
//! mutex が守るのは permit の判定と結果の記録だけで、ラップした呼び出しは
//! lock の外で実行する。遷移のたびに `generation` を進め、古い generation で
//! 記録された結果は無視する（Closed 中に始まった遅い呼び出しが、
//! 先に進んだ breaker を閉じたり開き直したりしない）。

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::BreakerError;
use crate::config::{BreakerConfig, ConfigError};
use crate::ports::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast.
    Open,
    /// A bounded number of probe calls test the operation.
    HalfOpen,
}

/// Point-in-time view of a breaker, for status pages and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub operation: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub probes_in_flight: u32,
    pub probe_successes: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub total_failures: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probes_in_flight: u32,
    probe_successes: u32,
    generation: u64,
    total_calls: u64,
    rejected_calls: u64,
    total_failures: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probes_in_flight: 0,
            probe_successes: 0,
            generation: 0,
            total_calls: 0,
            rejected_calls: 0,
            total_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Probe,
}

/// Circuit breaker guarding one operation kind.
///
/// Constructed explicitly (directly or through `BreakerRegistry`) and starts
/// Closed. Shared between callers by reference or `Arc`.
pub struct CircuitBreaker {
    operation: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Fails with `ConfigError::Invalid` for a zero failure threshold or a
    /// zero probe budget; either would leave the breaker unable to recover.
    pub fn new(
        operation: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(operation, config, clock))
    }

    pub fn with_system_clock(
        operation: impl Into<String>,
        config: BreakerConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(operation, config, Arc::new(SystemClock))
    }

    /// `config` must already have passed `BreakerConfig::validate`.
    pub(super) fn from_validated(
        operation: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            operation: operation.into(),
            config,
            clock,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Current state. An Open breaker whose recovery timeout has passed still
    /// reports Open until the next call turns it HalfOpen.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let s = self.lock();
        BreakerSnapshot {
            operation: self.operation.clone(),
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            opened_at: s.opened_at,
            probes_in_flight: s.probes_in_flight,
            probe_successes: s.probe_successes,
            total_calls: s.total_calls,
            rejected_calls: s.rejected_calls,
            total_failures: s.total_failures,
        }
    }

    /// Run `f` through the breaker. Any `Err` counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire::<E>()?;
        let result = f().await;
        permit.settle(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// Like `call`, but a call that exceeds `timeout` is abandoned and
    /// reported to the breaker as a failure.
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        timeout: Duration,
        f: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire::<E>()?;
        match tokio::time::timeout(timeout, f()).await {
            Ok(Ok(value)) => {
                permit.settle(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.settle(false);
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                permit.settle(false);
                debug!(operation = %self.operation, ?timeout, "call timed out");
                Err(BreakerError::Timeout {
                    operation: self.operation.clone(),
                    after: timeout,
                })
            }
        }
    }

    /// Decide, under the lock, whether this call may run.
    fn acquire<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let now = self.clock.now();
        let mut s = self.lock();

        if s.state == CircuitState::Open {
            let elapsed = s
                .opened_at
                .and_then(|at| now.signed_duration_since(at).to_std().ok())
                .unwrap_or(Duration::ZERO);
            if elapsed < self.config.recovery_timeout {
                s.rejected_calls += 1;
                return Err(BreakerError::CircuitOpen {
                    operation: self.operation.clone(),
                    retry_after: self.config.recovery_timeout - elapsed,
                });
            }
            self.transition(&mut s, CircuitState::HalfOpen, now);
        }

        let kind = match s.state {
            CircuitState::Closed => PermitKind::Normal,
            CircuitState::HalfOpen if s.probes_in_flight < self.config.half_open_max_calls => {
                s.probes_in_flight += 1;
                PermitKind::Probe
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                s.rejected_calls += 1;
                return Err(BreakerError::CircuitOpen {
                    operation: self.operation.clone(),
                    retry_after: Duration::ZERO,
                });
            }
        };
        s.total_calls += 1;

        Ok(Permit {
            breaker: self,
            kind,
            generation: s.generation,
            settled: false,
        })
    }

    fn record(&self, kind: PermitKind, generation: u64, success: bool) {
        let now = self.clock.now();
        let mut s = self.lock();
        if !success {
            s.total_failures += 1;
        }
        if s.generation != generation {
            // Outcome of a call admitted before the last transition.
            return;
        }

        match (kind, success) {
            (PermitKind::Normal, true) => {
                s.consecutive_failures = 0;
            }
            (PermitKind::Normal, false) => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut s, CircuitState::Open, now);
                }
            }
            (PermitKind::Probe, true) => {
                s.probes_in_flight = s.probes_in_flight.saturating_sub(1);
                s.probe_successes += 1;
                if s.probe_successes >= self.config.half_open_max_calls {
                    self.transition(&mut s, CircuitState::Closed, now);
                }
            }
            (PermitKind::Probe, false) => {
                self.transition(&mut s, CircuitState::Open, now);
            }
        }
    }

    fn transition(&self, s: &mut BreakerState, to: CircuitState, now: DateTime<Utc>) {
        let from = s.state;
        s.state = to;
        s.generation += 1;
        s.consecutive_failures = 0;
        s.probes_in_flight = 0;
        s.probe_successes = 0;
        s.opened_at = match to {
            CircuitState::Open => Some(now),
            CircuitState::HalfOpen => s.opened_at,
            CircuitState::Closed => None,
        };
        if to == CircuitState::Open {
            warn!(operation = %self.operation, ?from, "circuit opened");
        } else {
            info!(operation = %self.operation, ?from, ?to, "circuit state changed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Counters only; a panic elsewhere cannot leave them half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call. Dropping it unsettled (the caller's future
/// was cancelled) records a failure, so a probe slot is never leaked.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.kind, self.generation, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(operation = %self.breaker.operation, "call abandoned before completion");
            self.breaker.record(self.kind, self.generation, false);
        }
    }
}
