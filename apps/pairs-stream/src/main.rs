//! Pairs Stream Binary
//!
//! Streams trade ticks for the configured symbols into the tick store and
//! periodically logs pair analytics.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pairs-stream
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `PAIRS_SYMBOLS`: comma-separated symbols (default: btcusdt,ethusdt)
//! - `PAIRS_DB_PATH`: SQLite file (default: market_data.db)
//! - `PAIRS_FEED_BASE_URL`: trade-stream endpoint (default: wss://fstream.binance.com/ws)
//! - `PAIRS_TIMEFRAME`, `PAIRS_ZSCORE_WINDOW`, `PAIRS_ZSCORE_THRESHOLD`: analytics defaults
//! - `PAIRS_RETENTION_KEEP_LAST`, `PAIRS_RETENTION_INTERVAL_SECS`: retention trim
//! - `PAIRS_SNAPSHOT_INTERVAL_SECS`: analytics log cadence (0 = off)
//! - `PAIRS_HEALTH_PORT`: health server port (default: 8083, 0 = off)
//! - `PAIRS_EXPORT_DIR`: write bars CSV here on shutdown
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: log filter (default: pairs_stream=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pairs_stream::domain::analytics::adf_test;
use pairs_stream::infrastructure::export;
use pairs_stream::infrastructure::health::{HealthServer, HealthServerState};
use pairs_stream::infrastructure::telemetry;
use pairs_stream::{
    MarketDataService, PipelineConfig, TickStore, WebSocketConnector, ZScoreAlert, init_metrics,
};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Pairs Stream");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = PipelineConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(
        TickStore::open(&config.db_path)
            .with_context(|| format!("failed to open tick store {}", config.db_path.display()))?,
    );
    let connector = Arc::new(WebSocketConnector::new(config.stream.base_url.clone()));
    let service = Arc::new(MarketDataService::new(
        store,
        connector,
        config.stream.clone(),
        config.analytics,
        config.retention,
        tokio::runtime::Handle::current(),
    ));

    tracing::info!(stored_ticks = service.get_tick_count(), "Tick store opened");

    // Health server
    if config.health_port > 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&service),
        ));
        let health_server =
            HealthServer::new(config.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Periodic retention trim
    if !config.retention.interval.is_zero() {
        tokio::spawn(run_retention(
            Arc::clone(&service),
            config.retention.interval,
            shutdown_token.clone(),
        ));
    }

    // Periodic analytics snapshot
    if !config.snapshot_interval.is_zero() {
        tokio::spawn(run_snapshots(
            Arc::clone(&service),
            config.snapshot_interval,
            shutdown_token.clone(),
        ));
    }

    service.start_stream(&config.symbols);
    tracing::info!("Pairs stream ready");

    await_shutdown(shutdown_token).await;

    service.stop_stream();
    if !service.wait_for_quiescence(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Shutdown timeout reached with connections still open");
    }

    if let Some(dir) = &config.export_dir {
        let rows = service.export_bars();
        match rows {
            Ok(rows) => {
                if let Err(e) = export::write_bars_csv(dir, config.analytics.timeframe, &rows) {
                    tracing::error!(error = %e, "Bar export failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "No bars to export"),
        }
    }

    tracing::info!(stored_ticks = service.get_tick_count(), "Pairs stream stopped");
    Ok(())
}

/// Trim the store to the configured keep-count on a fixed cadence.
async fn run_retention(
    service: Arc<MarketDataService>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = timer.tick() => {
                let service = Arc::clone(&service);
                if let Err(e) = tokio::task::spawn_blocking(move || service.apply_retention()).await {
                    tracing::error!(error = %e, "Retention task failed");
                }
            }
        }
    }
}

/// Log bars, pair statistics and alerts on a fixed cadence.
async fn run_snapshots(
    service: Arc<MarketDataService>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = timer.tick() => {
                let service = Arc::clone(&service);
                if let Err(e) = tokio::task::spawn_blocking(move || log_snapshot(&service)).await {
                    tracing::error!(error = %e, "Snapshot task failed");
                }
            }
        }
    }
}

fn log_snapshot(service: &MarketDataService) {
    let snapshot = match service.pair_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "Snapshot failed");
            return;
        }
    };

    for (symbol, bars) in &snapshot.bars {
        if let Some(bar) = bars.last() {
            tracing::info!(
                symbol = %symbol,
                timeframe = %snapshot.timeframe,
                bars = bars.len(),
                close = bar.close,
                volume = bar.volume,
                "Latest bar"
            );
        }
    }

    let pair = match &snapshot.pair {
        Ok(pair) => pair,
        Err(e) => {
            tracing::info!(reason = %e, records = snapshot.quality.total_records, "Collecting more data");
            return;
        }
    };

    let correlation = pair
        .correlation
        .as_deref()
        .and_then(pairs_stream::domain::analytics::latest_finite);
    tracing::info!(
        pair = %format!("{}/{}", pair.symbol_a, pair.symbol_b),
        hedge_ratio = pair.hedge_ratio,
        zscore = ?pair.latest_zscore,
        correlation = ?correlation,
        "Pair analytics"
    );

    if let ZScoreAlert::Alert { zscore } = pair.alert {
        tracing::warn!(
            zscore,
            threshold = service.analytics_settings().zscore_threshold,
            "Z-score alert"
        );
    }

    match adf_test(&pair.spread) {
        Ok(adf) => tracing::info!(
            statistic = adf.statistic,
            p_value = adf.p_value,
            stationary = adf.is_stationary(0.05),
            "Spread stationarity"
        ),
        Err(e) => tracing::debug!(reason = %e, "Stationarity test skipped"),
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &PipelineConfig) {
    tracing::info!(
        symbols = ?config.symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        db_path = %config.db_path.display(),
        timeframe = %config.analytics.timeframe,
        zscore_window = config.analytics.zscore_window,
        zscore_threshold = config.analytics.zscore_threshold,
        health_port = config.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.stream.base_url,
        receive_timeout_secs = config.stream.receive_timeout.as_secs(),
        ping_interval_secs = config.stream.ping_interval.as_secs(),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Stream settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
