use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, error, warn};

use crate::clock::SharedClock;
use crate::config::{CircuitBreakerConfig, HealthMonitorConfig};
use crate::error::{ProtectionError, Result};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::tasks::BackgroundTask;

/// Probe latency above which a live store is reported as degraded.
const DEGRADED_LATENCY_MS: u64 = 1_000;

/// Result of one liveness probe against the backing store.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Round-trip time of the liveness query
    pub latency_ms: u64,
    /// Load metric reported by the store (active connection count)
    pub active_connections: u64,
}

/// Probe seam supplied by the database-access layer.
///
/// Implementations run a minimal liveness query (e.g. `SELECT 1` plus an
/// active-connection count). Errors count as probe failures; the monitor
/// enforces its own hard timeout around the call.
#[async_trait]
pub trait StoreProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeOutcome>;
}

/// Derived health classification of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Rolling statistics from the probe loop, exposed read-only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    /// Active connections reported by the most recent successful probe
    pub active: u64,
    /// Total probes run
    pub total: u64,
    /// Probes that failed or timed out
    pub errors: u64,
    /// Wall-clock time of the most recent probe
    pub last_check_time: Option<DateTime<Utc>>,
    /// Latency of the most recent successful probe in milliseconds
    pub response_time_ms: u64,
}

/// Result of one health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: HealthStatus,
    pub stats: ConnectionStats,
    pub circuit_state: CircuitState,
}

/// Active health monitor for the backing store.
///
/// Owns the circuit breaker and feeds it probe results; runs continuously
/// on a background timer independent of request volume, and can also be
/// probed synchronously via [`HealthMonitor::check_health`].
pub struct HealthMonitor {
    breaker: Arc<CircuitBreaker>,
    probe: Arc<dyn StoreProbe>,
    config: HealthMonitorConfig,
    stats: RwLock<ConnectionStats>,
    last_status: RwLock<HealthStatus>,
}

impl HealthMonitor {
    /// Create a new health monitor with the given probe and configuration
    pub fn new(
        probe: Arc<dyn StoreProbe>,
        breaker_config: CircuitBreakerConfig,
        config: HealthMonitorConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(breaker_config, clock)),
            probe,
            config,
            stats: RwLock::new(ConnectionStats::default()),
            // Assume healthy until the first probe says otherwise
            last_status: RwLock::new(HealthStatus::Healthy),
        }
    }

    fn classify(&self, outcome: &ProbeOutcome) -> HealthStatus {
        if outcome.active_connections >= self.config.max_connections {
            HealthStatus::Unhealthy
        } else if outcome.active_connections >= self.config.connection_warning_threshold
            || outcome.latency_ms > DEGRADED_LATENCY_MS
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Run one probe under the configured hard timeout and update the
    /// breaker and stats accordingly.
    pub async fn check_health(&self) -> HealthReport {
        let timeout = self.config.probe_timeout;

        let outcome = match time::timeout(timeout, self.probe.probe()).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProtectionError::ProbeTimeout(timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(outcome) => {
                self.breaker.record_success().await;

                let status = self.classify(&outcome);
                let stats = {
                    let mut stats = self.stats.write().await;
                    stats.active = outcome.active_connections;
                    stats.total += 1;
                    stats.response_time_ms = outcome.latency_ms;
                    stats.last_check_time = Some(Utc::now());
                    stats.clone()
                };

                *self.last_status.write().await = status;

                match status {
                    HealthStatus::Healthy => {
                        debug!(
                            latency_ms = outcome.latency_ms,
                            active = outcome.active_connections,
                            "Store probe succeeded"
                        );
                    }
                    _ => {
                        warn!(
                            status = %status,
                            latency_ms = outcome.latency_ms,
                            active = outcome.active_connections,
                            "Store is under pressure"
                        );
                    }
                }

                HealthReport {
                    healthy: status == HealthStatus::Healthy,
                    status,
                    stats,
                    circuit_state: self.breaker.state().await,
                }
            }
            Err(e) => {
                error!(error = %e, "Store probe failed");
                self.breaker.record_failure().await;

                let stats = {
                    let mut stats = self.stats.write().await;
                    stats.total += 1;
                    stats.errors += 1;
                    stats.last_check_time = Some(Utc::now());
                    stats.clone()
                };

                *self.last_status.write().await = HealthStatus::Unhealthy;

                HealthReport {
                    healthy: false,
                    status: HealthStatus::Unhealthy,
                    stats,
                    circuit_state: self.breaker.state().await,
                }
            }
        }
    }

    /// Gate a request on the breaker state. Read-only except for the lazy
    /// open-to-half-open transition once the recovery timeout elapses.
    pub async fn should_allow_request(&self) -> bool {
        self.breaker.should_allow_request().await
    }

    /// Most recent derived status, without probing inline.
    pub async fn last_status(&self) -> HealthStatus {
        *self.last_status.read().await
    }

    /// Current breaker state.
    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Seconds until trial traffic is allowed, 0 unless the circuit is open.
    pub async fn recovery_remaining_secs(&self) -> u64 {
        self.breaker.recovery_remaining_secs().await
    }

    /// Breaker snapshot for the stats endpoint.
    pub async fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot().await
    }

    /// Connection stats snapshot for the stats endpoint.
    pub async fn connection_stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }

    /// Operator-triggered recovery: close the circuit and zero counters.
    pub async fn reset(&self) {
        self.breaker.reset().await;
        *self.last_status.write().await = HealthStatus::Healthy;
    }

    /// Start the background probe loop.
    pub fn start(self: &Arc<Self>) -> BackgroundTask {
        let monitor = Arc::clone(self);
        BackgroundTask::spawn("health-probe", self.config.check_interval, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                let _ = monitor.check_health().await;
            }
        })
    }
}
