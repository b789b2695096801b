use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;

/// The state of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are failing fast and not reaching the store
    Open,
    /// Circuit is partially open, allowing trial traffic to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Read-only view of the breaker for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    pub last_failure_at_ms: Option<u64>,
}

/// Circuit breaker implementation
///
/// Counters and timestamps are mutated only by the probe path
/// ([`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`])
/// and by the operator [`CircuitBreaker::reset`]; request handling only
/// calls [`CircuitBreaker::should_allow_request`].
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Current state of the circuit breaker
    state: RwLock<CircuitState>,
    /// Count of consecutive failures
    failure_count: AtomicUsize,
    /// Count of consecutive successes while half-open
    success_count: AtomicUsize,
    /// Epoch millis of the most recent failure
    last_failure_at: RwLock<Option<u64>>,
    /// Configuration for the circuit breaker
    config: CircuitBreakerConfig,
    clock: SharedClock,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            success_count: AtomicUsize::new(0),
            last_failure_at: RwLock::new(None),
            config,
            clock,
        }
    }

    fn recovery_timeout_ms(&self) -> u64 {
        self.config.recovery_timeout.as_millis() as u64
    }

    /// Check if the circuit breaker allows the request to proceed.
    ///
    /// While open, the first caller after the recovery timeout elapses
    /// transitions the breaker to half-open as a side effect and is
    /// admitted as trial traffic.
    pub async fn should_allow_request(&self) -> bool {
        // Get a copy of the current state to avoid holding the lock
        let current_state = *self.state.read().await;

        match current_state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_failure = *self.last_failure_at.read().await;

                if let Some(at) = last_failure {
                    let now = self.clock.now_millis();
                    if now.saturating_sub(at) >= self.recovery_timeout_ms() {
                        let mut state = self.state.write().await;
                        *state = CircuitState::HalfOpen;
                        self.success_count.store(0, Ordering::SeqCst);
                        debug!("Circuit breaker state transitioned to half-open");
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => {
                // Trial traffic is allowed through while half-open
                true
            }
        }
    }

    /// Record a successful probe
    pub async fn record_success(&self) {
        let current_state = *self.state.read().await;

        match current_state {
            CircuitState::Closed => {
                // Failures must be consecutive to open the circuit
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let new_success_count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;

                if new_success_count >= self.config.success_threshold {
                    let mut state = self.state.write().await;
                    *state = CircuitState::Closed;
                    self.success_count.store(0, Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    info!(
                        "Circuit breaker closed after {} successful probes",
                        new_success_count
                    );
                }
            }
            CircuitState::Open => {
                // The probe loop only reports here after allow_request let
                // it through, so this is unexpected while open
                debug!("Received success in Open state - this is unexpected");
            }
        }
    }

    /// Record a failed probe
    pub async fn record_failure(&self) {
        let now = self.clock.now_millis();
        let current_state = *self.state.read().await;

        match current_state {
            CircuitState::Closed => {
                let new_failure_count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;

                {
                    let mut last_failure = self.last_failure_at.write().await;
                    *last_failure = Some(now);
                }

                if new_failure_count >= self.config.failure_threshold {
                    let mut state = self.state.write().await;
                    *state = CircuitState::Open;
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        new_failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure while half-open re-opens the circuit and
                // restarts the recovery clock
                {
                    let mut state = self.state.write().await;
                    *state = CircuitState::Open;
                }

                {
                    let mut last_failure = self.last_failure_at.write().await;
                    *last_failure = Some(now);
                }

                self.failure_count.fetch_add(1, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                warn!("Circuit breaker re-opened after failure in half-open state");
            }
            CircuitState::Open => {
                let mut last_failure = self.last_failure_at.write().await;
                *last_failure = Some(now);
            }
        }
    }

    /// Operator-triggered recovery: force Closed and zero all counters.
    pub async fn reset(&self) {
        {
            let mut state = self.state.write().await;
            *state = CircuitState::Closed;
        }

        {
            let mut last_failure = self.last_failure_at.write().await;
            *last_failure = None;
        }

        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        info!("Circuit breaker manually reset to closed");
    }

    /// Get the current state of the circuit breaker
    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Seconds until the recovery timeout elapses, 0 unless open.
    pub async fn recovery_remaining_secs(&self) -> u64 {
        if *self.state.read().await != CircuitState::Open {
            return 0;
        }

        let last_failure = *self.last_failure_at.read().await;
        match last_failure {
            Some(at) => (at + self.recovery_timeout_ms())
                .saturating_sub(self.clock.now_millis())
                .div_ceil(1000),
            None => 0,
        }
    }

    /// Read-only snapshot for the stats endpoint.
    pub async fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: *self.state.read().await,
            failure_count: self.failure_count.load(Ordering::SeqCst),
            success_count: self.success_count.load(Ordering::SeqCst),
            last_failure_at_ms: *self.last_failure_at.read().await,
        }
    }
}
