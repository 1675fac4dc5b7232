//! Consecutive-failure circuit breaker for harvest runs.
//!
//! Isolated bad batches are expected and merely counted. A run of failed
//! batches longer than the threshold points at a systemic outage (blocked
//! proxy, remote maintenance), and the breaker opens so the controller can
//! abandon the run and leave the job for a later cycle.
//!
//! ```text
//! CLOSED --[failure_threshold + 1 consecutive failures]--> OPEN
//! ```
//!
//! Each job gets a fresh breaker, so an open breaker never closes again.

use std::sync::{Arc, Mutex};

/// Current state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Batches flow normally.
    Closed,
    /// Too many consecutive failures; the current run should stop.
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    total_failures: u64,
    last_failure: Option<String>,
}

/// Snapshot of breaker state for logging.
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_failure: Option<String>,
}

/// Opens after more than `failure_threshold` consecutive failures.
#[derive(Clone)]
pub struct ConsecutiveFailureBreaker {
    name: String,
    failure_threshold: u32,
    inner: Arc<Mutex<BreakerInner>>,
}

impl ConsecutiveFailureBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                total_failures: 0,
                last_failure: None,
            })),
        }
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock_inner();
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            last_failure: inner.last_failure.clone(),
        }
    }

    /// A good batch breaks the failure streak.
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    /// Count a failed batch. Returns true when this failure opened the
    /// breaker (or it was already open).
    pub fn record_failure(&self, reason: impl Into<String>) -> bool {
        let mut inner = self.lock_inner();
        inner.consecutive_failures += 1;
        inner.total_failures += 1;
        inner.last_failure = Some(reason.into());

        if inner.state == CircuitState::Closed
            && inner.consecutive_failures > self.failure_threshold
        {
            tracing::warn!(
                circuit = %self.name,
                failures = inner.consecutive_failures,
                "Circuit breaker opening after {} consecutive failures",
                inner.consecutive_failures
            );
            inner.state = CircuitState::Open;
        }
        inner.state == CircuitState::Open
    }
}
