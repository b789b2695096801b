// library entry
pub mod admission;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod resilience;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export key components for convenience
pub use admission::{AdmissionDecision, ProtectionLayer};
pub use cache::QueryCache;
pub use error::{ProtectionError, Result};
pub use limiter::RateLimiter;
pub use logging::init as init_logging;
pub use resilience::{CircuitBreaker, CircuitState, HealthMonitor};
