// src/limiter/mod.rs

//! Sliding-window admission control.
//!
//! The limiter keeps an ordered sequence of request timestamps per
//! (endpoint, client) pair and admits a request only while the count of
//! timestamps inside the trailing window stays below the endpoint's
//! limit. The window slides continuously with `now`, so there is no
//! bucket-boundary burst artifact.
//!
//! The limiter is purely computational: it performs no I/O and cannot
//! fail. It is the first gate a request passes, before the circuit
//! breaker is consulted.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::SharedClock;
use crate::config::RateLimiterConfig;
use crate::tasks::BackgroundTask;

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,

    /// Limit applied to this endpoint
    pub limit: u64,

    /// Requests left in the current window after this one
    pub remaining: u64,

    /// When the window frees a slot, in epoch milliseconds
    pub reset_at_ms: u64,

    /// Seconds the client should wait before retrying (denials only)
    pub retry_after_secs: u64,
}

/// Snapshot of the limiter for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    /// Number of (endpoint, client) keys currently tracked
    pub active_keys: usize,
    /// Window duration in milliseconds
    pub window_ms: u64,
    /// Limit for endpoints without an explicit entry
    pub default_limit: u64,
    /// Configured per-endpoint overrides
    pub per_endpoint_limits: HashMap<String, u64>,
}

/// Per-(endpoint, client) sliding-window rate limiter.
///
/// Windows are created lazily on first request for a key and garbage
/// collected by [`RateLimiter::sweep`] once every timestamp in them has
/// aged out.
#[derive(Debug)]
pub struct RateLimiter {
    /// Request timestamps (epoch millis) per "endpoint:client" key
    windows: Mutex<HashMap<String, Vec<u64>>>,
    config: RateLimiterConfig,
    clock: SharedClock,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration and clock
    pub fn new(config: RateLimiterConfig, clock: SharedClock) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    fn limit_for(&self, endpoint: &str) -> u64 {
        self.config
            .per_endpoint_limits
            .get(endpoint)
            .copied()
            .unwrap_or(self.config.default_limit)
    }

    fn window_ms(&self) -> u64 {
        self.config.window.as_millis() as u64
    }

    /// Check and record one request for the given endpoint and client.
    ///
    /// On admission the current timestamp is appended to the window. On
    /// denial `retry_after_secs` reports when the oldest in-window
    /// request will age out, floored at one second.
    pub fn check(&self, endpoint: &str, client_id: &str) -> RateLimitDecision {
        let limit = self.limit_for(endpoint);
        let now = self.clock.now_millis();
        let window_ms = self.window_ms();

        // A zero limit means the endpoint is shut off entirely
        if limit == 0 {
            debug!(endpoint = endpoint, client = client_id, "Endpoint limit is 0, denying");
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at_ms: now + window_ms,
                retry_after_secs: self.config.window.as_secs().max(1),
            };
        }

        let key = format!("{}:{}", endpoint, client_id);
        let cutoff = now.saturating_sub(window_ms);

        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let timestamps = windows.entry(key).or_default();

        // Drop timestamps that have slid out of the trailing window
        timestamps.retain(|&ts| ts >= cutoff);

        let count = timestamps.len() as u64;
        if count < limit {
            timestamps.push(now);
            let oldest = timestamps[0];
            let decision = RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - count - 1,
                reset_at_ms: oldest + window_ms,
                retry_after_secs: 0,
            };
            trace!(
                endpoint = endpoint,
                client = client_id,
                remaining = decision.remaining,
                "Request admitted"
            );
            decision
        } else {
            // count >= limit >= 1, so the window is non-empty
            let oldest = timestamps[0];
            let reset_at_ms = oldest + window_ms;
            let retry_after_secs = reset_at_ms.saturating_sub(now).div_ceil(1000).max(1);

            debug!(
                endpoint = endpoint,
                client = client_id,
                limit,
                retry_after_secs,
                "Rate limit exceeded"
            );

            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at_ms,
                retry_after_secs,
            }
        }
    }

    /// Forget all recorded requests for one (endpoint, client) pair.
    pub fn reset_key(&self, endpoint: &str, client_id: &str) {
        let key = format!("{}:{}", endpoint, client_id);
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(&key);
    }

    /// Drop keys whose timestamp sequences have fully expired.
    ///
    /// Called periodically by the background sweeper to bound memory;
    /// request handling already prunes the keys it touches.
    pub fn sweep(&self) {
        let cutoff = self.clock.now_millis().saturating_sub(self.window_ms());
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");

        let before = windows.len();
        windows.retain(|_, timestamps| {
            timestamps.retain(|&ts| ts >= cutoff);
            !timestamps.is_empty()
        });

        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, "Swept expired rate-limit keys");
        }
    }

    /// Number of (endpoint, client) keys currently tracked.
    pub fn active_keys(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }

    /// Snapshot for the stats endpoint.
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            active_keys: self.active_keys(),
            window_ms: self.window_ms(),
            default_limit: self.config.default_limit,
            per_endpoint_limits: self.config.per_endpoint_limits.clone(),
        }
    }

    /// Start the background sweep task.
    pub fn start_sweeper(self: &Arc<Self>) -> BackgroundTask {
        let limiter = Arc::clone(self);
        BackgroundTask::spawn("limiter-sweep", self.config.sweep_interval, move || {
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.sweep();
            }
        })
    }
}
