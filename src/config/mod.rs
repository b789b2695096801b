// src/config/mod.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the sliding-window rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Window duration
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,

    /// Limit applied to endpoints without an explicit entry
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Per-endpoint request limits; a limit of 0 always denies
    #[serde(default)]
    pub per_endpoint_limits: HashMap<String, u64>,

    /// How often the background sweep drops fully-expired keys
    #[serde(default = "default_limiter_sweep", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            default_limit: default_limit(),
            per_endpoint_limits: HashMap::new(),
            sweep_interval: default_limiter_sweep(),
        }
    }
}

fn default_window() -> Duration {
    Duration::from_millis(60_000)
}

fn default_limit() -> u64 {
    100
}

fn default_limiter_sweep() -> Duration {
    Duration::from_secs(300)
}

/// Configuration for the circuit breaker state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive probe failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Duration to keep the circuit open before trial traffic is allowed
    #[serde(default = "default_recovery_timeout", with = "duration_serde")]
    pub recovery_timeout: Duration,

    /// Consecutive probe successes in half-open state to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_failure_threshold() -> usize {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_success_threshold() -> usize {
    3
}

/// Configuration for the health-probe loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// How often the background probe runs
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Hard deadline for a single probe; must be shorter than the interval
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Active-connection count at which the store is reported unhealthy
    #[serde(default = "default_max_connections")]
    pub max_connections: u64,

    /// Active-connection count at which the store is reported degraded
    #[serde(default = "default_warning_threshold")]
    pub connection_warning_threshold: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            probe_timeout: default_probe_timeout(),
            max_connections: default_max_connections(),
            connection_warning_threshold: default_warning_threshold(),
        }
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_connections() -> u64 {
    50
}

fn default_warning_threshold() -> u64 {
    40
}

/// Configuration for the read-through query cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when the caller does not pass one
    #[serde(default = "default_ttl", with = "duration_serde")]
    pub default_ttl: Duration,

    /// Maximum number of entries before nearest-expiry eviction kicks in
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// How often the background sweep purges expired entries
    #[serde(default = "default_cache_sweep", with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Fallback values served when an executor returns nothing or fails,
    /// keyed by cache-key prefix (e.g. "dashboard:" -> empty aggregate).
    /// Keys without a matching prefix fall back to `null`.
    #[serde(default)]
    pub prefix_defaults: HashMap<String, Value>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
            max_size: default_max_size(),
            sweep_interval: default_cache_sweep(),
            prefix_defaults: HashMap::new(),
        }
    }
}

fn default_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_max_size() -> usize {
    1_000
}

fn default_cache_sweep() -> Duration {
    Duration::from_secs(60)
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
