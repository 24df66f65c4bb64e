//! Per-backend circuit breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Configuration for a backend circuit breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// How long an open circuit rejects calls before probing half-open.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls flow through.
    Closed,
    /// Recent failures exceeded the threshold; calls are rejected.
    Open,
    /// Probing recovery; calls flow through until the verdict is in.
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// A three-state circuit breaker owned by a backend.
///
/// The scatter stage consults [`ready`](CircuitBreaker::ready) before
/// querying a backend and reports each worker outcome back via
/// [`record_success`](CircuitBreaker::record_success) /
/// [`record_failure`](CircuitBreaker::record_failure). Errors that are not
/// health signals (see `LodestarError::trips_breaker`) are recorded as
/// successes.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a breaker with the given thresholds.
    #[must_use]
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// An open breaker transitions to half-open once `reset_timeout` has
    /// elapsed, letting the next call probe the backend.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn ready(&self) -> bool {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.cfg.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful (or success-marked) call.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.cfg.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                }
            }
            // Late completion from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    /// Record a breaker-tripping failure.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.cfg.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, for monitoring.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("mutex poisoned").state
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cfg", &self.cfg)
            .field("state", &self.state())
            .finish()
    }
}
