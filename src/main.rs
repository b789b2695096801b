use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};

use medtrack_guard::admission::{AdmissionDecision, ProtectionLayer};
use medtrack_guard::cache::{build_key, QueryCache};
use medtrack_guard::clock::system_clock;
use medtrack_guard::config::{
    CacheConfig, CircuitBreakerConfig, HealthMonitorConfig, RateLimiterConfig,
};
use medtrack_guard::init_logging;
use medtrack_guard::limiter::RateLimiter;
use medtrack_guard::resilience::{HealthMonitor, ProbeOutcome, StoreProbe};
use medtrack_guard::Result;

/// Stand-in probe for the demo binary; a real deployment supplies one
/// backed by the database connection pool.
#[derive(Debug)]
struct StubProbe;

#[async_trait::async_trait]
impl StoreProbe for StubProbe {
    async fn probe(&self) -> Result<ProbeOutcome> {
        Ok(ProbeOutcome {
            latency_ms: 3,
            active_connections: 2,
        })
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    info!("Database protection layer starting");

    let clock = system_clock();
    let limiter = Arc::new(RateLimiter::new(
        RateLimiterConfig::default(),
        Arc::clone(&clock),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        Arc::new(StubProbe),
        CircuitBreakerConfig::default(),
        HealthMonitorConfig::default(),
        Arc::clone(&clock),
    ));
    let cache = Arc::new(QueryCache::new(CacheConfig::default(), Arc::clone(&clock)));

    let limiter_sweeper = limiter.start_sweeper();
    let probe_loop = monitor.start();
    let cache_sweeper = cache.start_sweeper();

    let layer = ProtectionLayer::new(
        Arc::clone(&limiter),
        Arc::clone(&monitor),
        Arc::clone(&cache),
    );

    // Exercise one admission and one cached query so the demo has output
    match layer.admit("/api/equipment", "demo-client").await {
        AdmissionDecision::Allowed(headers) => {
            info!(remaining = headers.remaining, "Request admitted")
        }
        AdmissionDecision::RateLimited { retry_after_secs } => {
            warn!(retry_after_secs, "Rate limited")
        }
        AdmissionDecision::ServiceUnavailable { circuit_state, .. } => {
            warn!(circuit_state = %circuit_state, "Store unavailable")
        }
    }

    let key = build_key(
        "equipment:list",
        &[("status", "active"), ("department", "icu")],
    );
    let value = cache
        .cache_query(&key, None, || async {
            Ok(serde_json::json!({ "items": [], "total": 0 }))
        })
        .await;
    info!(key = %key, value = %value, "Cached query result");

    let stats = layer.stats().await;
    info!(
        stats = %serde_json::to_string(&stats).unwrap_or_default(),
        "Protection layer stats"
    );

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down");

    limiter_sweeper.stop();
    probe_loop.stop();
    cache_sweeper.stop();
}
