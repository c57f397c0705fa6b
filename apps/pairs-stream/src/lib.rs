#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::cast_precision_loss,
        clippy::items_after_statements
    )
)]

//! Pairs Stream - Live Tick Ingestion and Pairs Analytics
//!
//! Streams trade ticks for a set of instruments from a per-symbol WebSocket
//! feed, persists them in a SQLite tick store, and derives the statistics
//! used for pairs-trading analysis from the stored ticks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and pure computation
//!   - `tick`: Trade ticks and validated symbols
//!   - `connection`: Connection states and retry/backoff transitions
//!   - `analytics`: OHLCV resampling, hedge ratio, spread, z-score,
//!     rolling correlation, ADF stationarity test
//!
//! - **Application**: Ports and the collaborator-facing service
//!   - `ports`: Feed connector/session and tick sink interfaces
//!   - `services`: `MarketDataService` facade and pair snapshots
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `storage`: Mutex-serialized SQLite tick store
//!   - `binance`: Trade stream codec and WebSocket connector
//!   - `ingestion`: Per-symbol stream connections and their manager
//!   - `config`, `telemetry`, `metrics`, `health`, `export`
//!
//! # Data Flow
//!
//! ```text
//! feed WS (btcusdt) ──► StreamConnection ──┐
//! feed WS (ethusdt) ──► StreamConnection ──┼──► TickStore ──► MarketDataService ──► analytics
//! feed WS (...)     ──► StreamConnection ──┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types and pure analytics.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::analytics::{
    AdfOutcome, AnalyticsError, AnalyticsResult, Bar, Timeframe, ZScoreAlert,
};
pub use domain::connection::{ConnectionState, RetryDecision, RetryTracker};
pub use domain::tick::{Symbol, SymbolError, Tick};

// Application
pub use application::ports::{FeedConnector, FeedError, FeedFrame, FeedSession, TickSink};
pub use application::services::{MarketDataService, PairAnalytics, PairSnapshot};

// Infrastructure
pub use infrastructure::binance::{TradeCodec, WebSocketConnector};
pub use infrastructure::config::{ConfigError, PipelineConfig, StreamSettings};
pub use infrastructure::ingestion::{
    ConnectionSnapshot, ConnectionStatus, IngestionManager, StreamConnection,
};
pub use infrastructure::storage::{StorageError, TickStore};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
