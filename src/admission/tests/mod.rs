// src/admission/tests/mod.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::admission::{
    AdmissionDecision, ProtectionLayer, HEADER_CIRCUIT_STATE, HEADER_RATELIMIT_LIMIT,
    HEADER_RATELIMIT_REMAINING,
};
use crate::cache::QueryCache;
use crate::config::{
    CacheConfig, CircuitBreakerConfig, HealthMonitorConfig, RateLimiterConfig,
};
use crate::limiter::RateLimiter;
use crate::resilience::{CircuitState, HealthMonitor, HealthStatus};
use crate::test_utils::{ManualClock, MockProbe};

fn layer_with(default_limit: u64) -> (ProtectionLayer, Arc<ManualClock>, Arc<MockProbe>) {
    let clock = ManualClock::new(1_000_000);
    let probe = MockProbe::new();

    let limiter = Arc::new(RateLimiter::new(
        RateLimiterConfig {
            window: Duration::from_secs(60),
            default_limit,
            per_endpoint_limits: HashMap::new(),
            sweep_interval: Duration::from_secs(300),
        },
        clock.clone(),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        probe.clone(),
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(15),
            success_threshold: 3,
        },
        HealthMonitorConfig {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_millis(100),
            max_connections: 50,
            connection_warning_threshold: 40,
        },
        clock.clone(),
    ));
    let cache = Arc::new(QueryCache::new(CacheConfig::default(), clock.clone()));

    (ProtectionLayer::new(limiter, monitor, cache), clock, probe)
}

#[tokio::test]
async fn test_admitted_request_carries_headers() {
    let (layer, _clock, _probe) = layer_with(5);

    let decision = layer.admit("/api/equipment", "client-1").await;
    match decision {
        AdmissionDecision::Allowed(headers) => {
            assert_eq!(headers.limit, 5);
            assert_eq!(headers.remaining, 4);
            assert_eq!(headers.health_status, HealthStatus::Healthy);
            assert_eq!(headers.circuit_state, CircuitState::Closed);

            let pairs = headers.to_pairs();
            let names: Vec<&str> = pairs.iter().map(|(name, _)| *name).collect();
            assert!(names.contains(&HEADER_RATELIMIT_LIMIT));
            assert!(names.contains(&HEADER_RATELIMIT_REMAINING));
            assert!(names.contains(&HEADER_CIRCUIT_STATE));
        }
        other => panic!("Expected Allowed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_denial_maps_to_429_shape() {
    let (layer, _clock, _probe) = layer_with(1);

    assert!(matches!(
        layer.admit("/api/equipment", "client-1").await,
        AdmissionDecision::Allowed(_)
    ));

    match layer.admit("/api/equipment", "client-1").await {
        AdmissionDecision::RateLimited { retry_after_secs } => {
            assert!(retry_after_secs > 0);
        }
        other => panic!("Expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_open_circuit_maps_to_503_shape() {
    let (layer, _clock, probe) = layer_with(100);

    for _ in 0..3 {
        probe.push_err("connection refused");
        layer.monitor().check_health().await;
    }

    match layer.admit("/api/equipment", "client-1").await {
        AdmissionDecision::ServiceUnavailable {
            status,
            circuit_state,
            retry_after_secs,
        } => {
            assert_eq!(status, HealthStatus::Unhealthy);
            assert_eq!(circuit_state, CircuitState::Open);
            assert!(retry_after_secs > 0);
        }
        other => panic!("Expected ServiceUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trial_traffic_admitted_after_recovery_timeout() {
    let (layer, clock, probe) = layer_with(100);

    for _ in 0..3 {
        probe.push_err("connection refused");
        layer.monitor().check_health().await;
    }
    assert!(matches!(
        layer.admit("/api/equipment", "client-1").await,
        AdmissionDecision::ServiceUnavailable { .. }
    ));

    clock.advance(Duration::from_secs(15));
    match layer.admit("/api/equipment", "client-2").await {
        AdmissionDecision::Allowed(headers) => {
            assert_eq!(headers.circuit_state, CircuitState::HalfOpen);
        }
        other => panic!("Expected Allowed trial traffic, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_checked_before_circuit() {
    let (layer, _clock, probe) = layer_with(1);

    for _ in 0..3 {
        probe.push_err("connection refused");
        layer.monitor().check_health().await;
    }

    // First request consumes the only slot but hits the open circuit
    assert!(matches!(
        layer.admit("/api/equipment", "client-1").await,
        AdmissionDecision::ServiceUnavailable { .. }
    ));

    // Second request is denied by the limiter, not the breaker
    assert!(matches!(
        layer.admit("/api/equipment", "client-1").await,
        AdmissionDecision::RateLimited { .. }
    ));
}

#[tokio::test]
async fn test_stats_snapshot_serializes() {
    let (layer, _clock, _probe) = layer_with(5);

    layer.admit("/api/equipment", "client-1").await;
    layer.monitor().check_health().await;
    layer
        .cache()
        .set("equipment:1", serde_json::json!({"id": 1}), None);
    layer.cache().get("equipment:1");

    let stats = layer.stats().await;
    assert_eq!(stats.rate_limiter.active_keys, 1);
    assert_eq!(stats.circuit.state, CircuitState::Closed);
    assert_eq!(stats.connections.total, 1);
    assert_eq!(stats.cache.size, 1);

    let rendered = serde_json::to_value(&stats).expect("stats must serialize");
    assert!(rendered.get("rate_limiter").is_some());
    assert!(rendered.get("circuit").is_some());
    assert!(rendered.get("cache").is_some());
}
