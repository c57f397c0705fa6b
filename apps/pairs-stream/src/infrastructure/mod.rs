//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process-level
//! concerns (configuration, tracing, metrics, health, export).

/// Trade-stream message model, JSON codec and WebSocket connector.
pub mod binance;

/// Configuration loaded from the environment.
pub mod config;

/// CSV export of resampled bars.
pub mod export;

/// Health check HTTP endpoint.
pub mod health;

/// Per-symbol stream connections and their manager.
pub mod ingestion;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// SQLite tick store.
pub mod storage;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
