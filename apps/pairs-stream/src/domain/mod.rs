//! Domain Layer - Core types and pure computation.
//!
//! Nothing in this layer performs I/O. Ticks are the only persisted entity;
//! everything under `analytics` is a pure function of ticks and parameters.

/// Trade ticks and validated instrument symbols.
pub mod tick;

/// Per-symbol connection states and retry/backoff transitions.
pub mod connection;

/// Time-series analytics over ticks.
pub mod analytics;
