// src/test_utils.rs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{ProtectionError, Result};
use crate::resilience::{ProbeOutcome, StoreProbe};

/// Manually advanced clock for deterministic timing tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(start_ms),
        })
    }

    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Scripted probe for health monitor tests.
///
/// Results are served in push order; once the script is exhausted the
/// probe reports a fast, lightly loaded store.
#[derive(Debug)]
pub struct MockProbe {
    script: Mutex<VecDeque<Result<ProbeOutcome>>>,
}

impl MockProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push_ok(&self, latency_ms: u64, active_connections: u64) {
        self.script
            .lock()
            .expect("mock probe mutex poisoned")
            .push_back(Ok(ProbeOutcome {
                latency_ms,
                active_connections,
            }));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .expect("mock probe mutex poisoned")
            .push_back(Err(ProtectionError::Probe(message.to_string())));
    }
}

#[async_trait]
impl StoreProbe for MockProbe {
    async fn probe(&self) -> Result<ProbeOutcome> {
        let scripted = self
            .script
            .lock()
            .expect("mock probe mutex poisoned")
            .pop_front();

        match scripted {
            Some(result) => result,
            None => Ok(ProbeOutcome {
                latency_ms: 5,
                active_connections: 1,
            }),
        }
    }
}

/// Probe that never answers; exercises the hard probe timeout.
#[derive(Debug)]
pub struct HangingProbe;

#[async_trait]
impl StoreProbe for HangingProbe {
    async fn probe(&self) -> Result<ProbeOutcome> {
        std::future::pending().await
    }
}
