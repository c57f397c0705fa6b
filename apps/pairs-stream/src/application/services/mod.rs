//! Application Services
//!
//! - `MarketDataService`: the pull-based operations a front end calls
//! - `PairSnapshot`: bars and pair statistics from one tick read

mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::application::ports::FeedConnector;
use crate::domain::analytics::{AdfOutcome, AnalyticsError, AnalyticsResult, Bar, adf_test};
use crate::domain::tick::{Symbol, Tick};
use crate::infrastructure::config::{AnalyticsSettings, RetentionSettings, StreamSettings};
use crate::infrastructure::ingestion::{ConnectionSnapshot, IngestionManager};
use crate::infrastructure::metrics;
use crate::infrastructure::storage::TickStore;

pub use snapshot::{PairAnalytics, PairSnapshot};

/// Facade over the tick store, the ingestion manager and the analytics
/// engine. All calls are synchronous and return benign defaults on
/// storage failure.
#[derive(Debug)]
pub struct MarketDataService {
    store: Arc<TickStore>,
    ingestion: IngestionManager,
    analytics: AnalyticsSettings,
    retention: RetentionSettings,
    symbols: parking_lot::RwLock<Vec<Symbol>>,
}

impl MarketDataService {
    /// Wire a service around `store`, streaming through `connector`.
    #[must_use]
    pub fn new(
        store: Arc<TickStore>,
        connector: Arc<dyn FeedConnector>,
        stream: StreamSettings,
        analytics: AnalyticsSettings,
        retention: RetentionSettings,
        runtime: Handle,
    ) -> Self {
        let ingestion = IngestionManager::new(connector, Arc::clone(&store) as _, stream, runtime);
        Self {
            store,
            ingestion,
            analytics,
            retention,
            symbols: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Underlying tick store.
    #[must_use]
    pub const fn store(&self) -> &Arc<TickStore> {
        &self.store
    }

    /// Analytics defaults in use.
    #[must_use]
    pub const fn analytics_settings(&self) -> &AnalyticsSettings {
        &self.analytics
    }

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------

    /// Most recent ticks (bounded by the configured read limit), oldest first.
    #[must_use]
    pub fn get_all_ticks(&self) -> Vec<Tick> {
        self.store.read_recent(self.retention.read_limit)
    }

    /// Number of stored ticks.
    #[must_use]
    pub fn get_tick_count(&self) -> usize {
        let count = self.store.count();
        metrics::set_stored_ticks(count);
        count
    }

    /// Keep only the `keep_last` most recent ticks. Returns ticks removed.
    pub fn cleanup_old_data(&self, keep_last: usize) -> usize {
        let removed = self.store.trim(keep_last);
        if removed > 0 {
            tracing::info!(removed, keep_last, "Trimmed old ticks");
        }
        removed
    }

    /// Apply the configured retention keep-count.
    pub fn apply_retention(&self) -> usize {
        self.cleanup_old_data(self.retention.keep_last)
    }

    /// Delete every stored tick.
    pub fn clear_all_data(&self) {
        self.store.clear();
        tracing::info!("Cleared all ticks");
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    /// Start streaming `symbols`. No-op (returns `false`) if already running.
    pub fn start_stream(&self, symbols: &[Symbol]) -> bool {
        let started = self.ingestion.start(symbols);
        if started {
            *self.symbols.write() = symbols.to_vec();
        }
        started
    }

    /// Request every connection to stop. Returns immediately.
    pub fn stop_stream(&self) {
        self.ingestion.stop();
    }

    /// Wait up to `timeout` for every connection to exit.
    pub async fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        self.ingestion.wait_quiescent(timeout).await
    }

    /// Whether streaming is active.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.ingestion.is_running()
    }

    /// Per-symbol connection status.
    #[must_use]
    pub fn connection_statuses(&self) -> Vec<ConnectionSnapshot> {
        self.ingestion.statuses()
    }

    /// Symbols of the latest stream start.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.read().clone()
    }

    // -------------------------------------------------------------------------
    // Analytics
    // -------------------------------------------------------------------------

    /// Bars per symbol and pair statistics for the streamed symbols.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a stored tick time cannot be bucketed.
    pub fn pair_snapshot(&self) -> AnalyticsResult<PairSnapshot> {
        self.snapshot_for(&self.symbols())
    }

    /// Bars per symbol and pair statistics for `symbols`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a stored tick time cannot be bucketed.
    pub fn snapshot_for(&self, symbols: &[Symbol]) -> AnalyticsResult<PairSnapshot> {
        let ticks = self.get_all_ticks();
        PairSnapshot::compute(&ticks, symbols, &self.analytics)
    }

    /// ADF test on the current pair spread.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` while fewer than 20 spread points exist,
    /// or the pair error if no spread can be computed.
    pub fn stationarity(&self) -> AnalyticsResult<AdfOutcome> {
        let pair = self.pair_snapshot()?.pair?;
        adf_test(&pair.spread)
    }

    /// Bars for every streamed symbol, flattened for export.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a stored tick time cannot be bucketed.
    pub fn export_bars(&self) -> AnalyticsResult<Vec<(Symbol, Bar)>> {
        let symbols = self.symbols();
        if symbols.is_empty() {
            return Err(AnalyticsError::InvalidInput("no symbols streamed".to_string()));
        }
        let snapshot = self.snapshot_for(&symbols)?;
        Ok(snapshot
            .bars
            .into_iter()
            .flat_map(|(symbol, bars)| bars.into_iter().map(move |bar| (symbol.clone(), bar)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{FeedError, FeedSession};
    use crate::domain::analytics::Timeframe;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};

    struct Unreachable;

    #[async_trait]
    impl FeedConnector for Unreachable {
        async fn connect(&self, _symbol: &Symbol) -> Result<Box<dyn FeedSession>, FeedError> {
            Err(FeedError::Closed)
        }
    }

    fn service() -> MarketDataService {
        MarketDataService::new(
            Arc::new(TickStore::in_memory().unwrap()),
            Arc::new(Unreachable),
            StreamSettings::default(),
            AnalyticsSettings {
                timeframe: Timeframe::OneSecond,
                zscore_window: 5,
                zscore_threshold: 2.0,
            },
            RetentionSettings {
                keep_last: 10,
                ..RetentionSettings::default()
            },
            Handle::current(),
        )
    }

    fn seed(service: &MarketDataService, n: i64) {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for i in 0..n {
            let ts = start + TimeDelta::seconds(i);
            let wobble = if i % 2 == 0 { 0.3 } else { -0.3 };
            service.store().insert(&Tick::new(ts, "btcusdt", 100.0 + i as f64 + wobble, 1.0));
            service.store().insert(&Tick::new(ts, "ethusdt", 50.0 + i as f64 * 0.5, 1.0));
        }
    }

    #[tokio::test]
    async fn storage_operations() {
        let service = service();
        seed(&service, 15);
        assert_eq!(service.get_tick_count(), 30);
        assert_eq!(service.get_all_ticks().len(), 30);

        assert_eq!(service.apply_retention(), 20);
        assert_eq!(service.get_tick_count(), 10);

        service.clear_all_data();
        assert_eq!(service.get_tick_count(), 0);
        assert!(service.get_all_ticks().is_empty());
    }

    #[tokio::test]
    async fn snapshot_and_stationarity() {
        let service = service();
        let symbols = vec![
            Symbol::parse("btcusdt").unwrap(),
            Symbol::parse("ethusdt").unwrap(),
        ];
        seed(&service, 40);

        let snapshot = service.snapshot_for(&symbols).unwrap();
        let pair = snapshot.pair.unwrap();
        assert!((pair.hedge_ratio - 2.0).abs() < 0.05);
        assert!(pair.correlation.is_some());

        // Nothing streamed yet, so the default snapshot has no pair.
        assert!(service.stationarity().is_err());
        assert!(service.export_bars().is_err());
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let service = service();
        service.stop_stream();
        assert!(!service.is_streaming());
        assert!(service.wait_for_quiescence(Duration::from_millis(10)).await);
        assert!(service.connection_statuses().is_empty());
    }
}
