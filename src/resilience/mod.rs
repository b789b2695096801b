// src/resilience/mod.rs
//! Backing-store health monitoring and circuit breaking.
//!
//! Two cooperating pieces protect the store from request traffic it
//! cannot absorb:
//!
//! 1. **Circuit Breaker** - a Closed/Open/HalfOpen state machine fed
//!    exclusively by probe results; request handling only reads it.
//! 2. **Health Monitor** - a timeout-bounded probe loop that classifies
//!    the store as healthy, degraded or unhealthy and drives the breaker.

mod circuit_breaker;
mod health_monitor;

#[cfg(test)]
mod tests;

// Re-export key components
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use health_monitor::{
    ConnectionStats, HealthMonitor, HealthReport, HealthStatus, ProbeOutcome, StoreProbe,
};
