// src/clock.rs

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Millisecond clock used by every timing-sensitive component.
///
/// Production code uses [`SystemClock`]; tests inject a manually advanced
/// clock so window and recovery timings run on virtual time instead of
/// real sleeps.
pub trait Clock: Send + Sync + Debug {
    /// Current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock implementation backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

/// Shared clock handle passed into each component at construction.
pub type SharedClock = Arc<dyn Clock>;

/// Create the default wall-clock handle.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
