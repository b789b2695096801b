// src/admission/mod.rs

//! Admission facade combining the limiter, the breaker and the cache.
//!
//! One [`ProtectionLayer`] is constructed at process startup and handed
//! into request-handling code. For each inbound operation the web layer
//! calls [`ProtectionLayer::admit`] and maps the decision to a response:
//! `RateLimited` becomes HTTP 429 with a `Retry-After` header,
//! `ServiceUnavailable` becomes HTTP 503, and `Allowed` carries the
//! rate-limit and health headers to attach to the response.
//!
//! All state is per-process. Horizontally scaled deployments multiply
//! the effective limits by the instance count.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;

use crate::cache::{CacheStats, QueryCache};
use crate::limiter::{RateLimiter, RateLimiterStats};
use crate::resilience::{
    CircuitSnapshot, CircuitState, ConnectionStats, HealthMonitor, HealthStatus,
};

pub const HEADER_RATELIMIT_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_RATELIMIT_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RATELIMIT_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_HEALTH_STATUS: &str = "X-Health-Status";
pub const HEADER_CIRCUIT_STATE: &str = "X-Circuit-State";

/// Header values the web layer attaches to admitted responses.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionHeaders {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: u64,
    pub health_status: HealthStatus,
    pub circuit_state: CircuitState,
}

impl AdmissionHeaders {
    /// Render as header name/value pairs.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_RATELIMIT_LIMIT, self.limit.to_string()),
            (HEADER_RATELIMIT_REMAINING, self.remaining.to_string()),
            (HEADER_RATELIMIT_RESET, self.reset_at_ms.to_string()),
            (HEADER_HEALTH_STATUS, self.health_status.to_string()),
            (HEADER_CIRCUIT_STATE, self.circuit_state.to_string()),
        ]
    }
}

/// Outcome of admission control for one inbound request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// Request may proceed to the store
    Allowed(AdmissionHeaders),
    /// Rate limit exceeded; maps to HTTP 429 with a Retry-After header
    RateLimited { retry_after_secs: u64 },
    /// Circuit open; maps to HTTP 503 with retry guidance
    ServiceUnavailable {
        status: HealthStatus,
        circuit_state: CircuitState,
        retry_after_secs: u64,
    },
}

/// Combined snapshot of all three components for operational dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ProtectionStats {
    pub rate_limiter: RateLimiterStats,
    pub circuit: CircuitSnapshot,
    pub connections: ConnectionStats,
    pub cache: CacheStats,
}

/// Database-protection layer: rate limiter, health monitor and cache
/// behind one handle.
pub struct ProtectionLayer {
    limiter: Arc<RateLimiter>,
    monitor: Arc<HealthMonitor>,
    cache: Arc<QueryCache>,
}

impl ProtectionLayer {
    pub fn new(
        limiter: Arc<RateLimiter>,
        monitor: Arc<HealthMonitor>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            limiter,
            monitor,
            cache,
        }
    }

    /// Rate-limit then circuit-breaker check for one inbound request.
    ///
    /// The limiter is consulted first, so a rate-limited client is told
    /// to back off even while the store is degraded.
    pub async fn admit(&self, endpoint: &str, client_id: &str) -> AdmissionDecision {
        let decision = self.limiter.check(endpoint, client_id);
        if !decision.allowed {
            return AdmissionDecision::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            };
        }

        if !self.monitor.should_allow_request().await {
            return AdmissionDecision::ServiceUnavailable {
                status: self.monitor.last_status().await,
                circuit_state: self.monitor.circuit_state().await,
                retry_after_secs: self.monitor.recovery_remaining_secs().await.max(1),
            };
        }

        AdmissionDecision::Allowed(AdmissionHeaders {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at_ms: decision.reset_at_ms,
            health_status: self.monitor.last_status().await,
            circuit_state: self.monitor.circuit_state().await,
        })
    }

    /// JSON-serializable snapshot of all three components.
    pub async fn stats(&self) -> ProtectionStats {
        ProtectionStats {
            rate_limiter: self.limiter.stats(),
            circuit: self.monitor.circuit_snapshot().await,
            connections: self.monitor.connection_stats().await,
            cache: self.cache.stats(),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }
}
