// src/limiter/tests/mod.rs
