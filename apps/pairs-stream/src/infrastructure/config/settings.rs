//! Pipeline Configuration Settings
//!
//! Configuration types for the ingestion pipeline, loaded from environment
//! variables. Every value has a default; unparsable numbers fall back to
//! it. Values that would make the pipeline meaningless (no symbols, an
//! unknown timeframe, a zero window) are errors.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::analytics::Timeframe;
use crate::domain::tick::{Symbol, SymbolError};
use crate::infrastructure::binance::DEFAULT_BASE_URL;

const DEFAULT_SYMBOLS: &str = "btcusdt,ethusdt";
const DEFAULT_DB_PATH: &str = "market_data.db";

/// Per-connection stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Trade stream base URL; the endpoint is `{base_url}/{symbol}@trade`.
    pub base_url: String,
    /// Bound on each receive so a stop request is seen promptly.
    pub receive_timeout: Duration,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Pong deadline before the connection is declared dead.
    pub ping_timeout: Duration,
    /// Consecutive failures before a connection is marked failed.
    pub max_reconnect_attempts: u32,
    /// Log progress every this many ticks (0 = never).
    pub progress_log_every: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            receive_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            progress_log_every: 10,
        }
    }
}

/// Analytics parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsSettings {
    /// Default aggregation timeframe.
    pub timeframe: Timeframe,
    /// Rolling window for z-score and correlation.
    pub zscore_window: usize,
    /// Absolute z-score alert threshold.
    pub zscore_threshold: f64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::OneMinute,
            zscore_window: 50,
            zscore_threshold: 2.0,
        }
    }
}

/// Storage retention and read bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSettings {
    /// Ticks kept by a retention trim.
    pub keep_last: usize,
    /// Interval of the periodic trim (zero disables it).
    pub interval: Duration,
    /// Upper bound on ticks returned by a full read.
    pub read_limit: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            keep_last: 50_000,
            interval: Duration::from_secs(300),
            read_limit: 100_000,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Symbols to stream.
    pub symbols: Vec<Symbol>,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Analytics parameters.
    pub analytics: AnalyticsSettings,
    /// Retention settings.
    pub retention: RetentionSettings,
    /// Health server port (0 = disabled).
    pub health_port: u16,
    /// Interval of the analytics snapshot log (zero disables it).
    pub snapshot_interval: Duration,
    /// Directory for the bar CSV written on shutdown.
    pub export_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbols: Symbol::parse_list(DEFAULT_SYMBOLS).unwrap_or_default(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            stream: StreamSettings::default(),
            analytics: AnalyticsSettings::default(),
            retention: RetentionSettings::default(),
            health_port: 8083,
            snapshot_interval: Duration::from_secs(10),
            export_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list, timeframe or z-score window is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = EnvReader { lookup: &lookup };

        let symbols = Symbol::parse_list(
            &env.string("PAIRS_SYMBOLS")
                .unwrap_or_else(|| DEFAULT_SYMBOLS.to_string()),
        )?;

        let timeframe = match env.string("PAIRS_TIMEFRAME") {
            Some(raw) => raw
                .parse::<Timeframe>()
                .map_err(|_| ConfigError::InvalidTimeframe(raw))?,
            None => defaults.analytics.timeframe,
        };

        let zscore_window = env.parse("PAIRS_ZSCORE_WINDOW", defaults.analytics.zscore_window);
        if zscore_window == 0 {
            return Err(ConfigError::InvalidWindow);
        }

        let stream = StreamSettings {
            base_url: env
                .string("PAIRS_FEED_BASE_URL")
                .unwrap_or(defaults.stream.base_url),
            receive_timeout: env.secs(
                "PAIRS_WS_RECEIVE_TIMEOUT_SECS",
                defaults.stream.receive_timeout,
            ),
            ping_interval: env.secs("PAIRS_WS_PING_INTERVAL_SECS", defaults.stream.ping_interval),
            ping_timeout: env.secs("PAIRS_WS_PING_TIMEOUT_SECS", defaults.stream.ping_timeout),
            max_reconnect_attempts: env.parse(
                "PAIRS_MAX_RECONNECT_ATTEMPTS",
                defaults.stream.max_reconnect_attempts,
            ),
            progress_log_every: defaults.stream.progress_log_every,
        };

        let analytics = AnalyticsSettings {
            timeframe,
            zscore_window,
            zscore_threshold: env.parse(
                "PAIRS_ZSCORE_THRESHOLD",
                defaults.analytics.zscore_threshold,
            ),
        };

        let retention = RetentionSettings {
            keep_last: env.parse("PAIRS_RETENTION_KEEP_LAST", defaults.retention.keep_last),
            interval: env.secs("PAIRS_RETENTION_INTERVAL_SECS", defaults.retention.interval),
            read_limit: env.parse("PAIRS_READ_LIMIT", defaults.retention.read_limit),
        };

        Ok(Self {
            symbols,
            db_path: env
                .string("PAIRS_DB_PATH")
                .map_or(defaults.db_path, PathBuf::from),
            stream,
            analytics,
            retention,
            health_port: env.parse("PAIRS_HEALTH_PORT", defaults.health_port),
            snapshot_interval: env.secs("PAIRS_SNAPSHOT_INTERVAL_SECS", defaults.snapshot_interval),
            export_dir: env.string("PAIRS_EXPORT_DIR").map(PathBuf::from),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Symbol list failed validation.
    #[error("invalid symbols: {0}")]
    InvalidSymbols(#[from] SymbolError),
    /// Timeframe is not one of `1s`, `1m`, `5m`.
    #[error("unsupported timeframe '{0}' (expected 1s, 1m or 5m)")]
    InvalidTimeframe(String),
    /// Z-score window must be at least 1.
    #[error("PAIRS_ZSCORE_WINDOW must be at least 1")]
    InvalidWindow,
}

/// Typed reads over a key lookup; blank values count as unset.
struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }
}
