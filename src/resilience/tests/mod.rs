// src/resilience/tests/mod.rs
//! Tests for the circuit breaker and the health monitor
