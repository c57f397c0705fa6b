//! OHLCV Resampling
//!
//! Buckets ticks into fixed-width windows aligned to calendar boundaries
//! (the bucket start is the tick time truncated to the bucket width, counted
//! from the Unix epoch). Empty buckets are omitted; there is no forward-fill.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;

use super::{AnalyticsError, AnalyticsResult};
use crate::domain::tick::Tick;

/// Supported aggregation granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Timeframe {
    /// One second.
    #[serde(rename = "1s")]
    OneSecond,
    /// One minute.
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
    /// Five minutes.
    #[serde(rename = "5m")]
    FiveMinutes,
}

impl Timeframe {
    /// All supported timeframes.
    pub const ALL: [Self; 3] = [Self::OneSecond, Self::OneMinute, Self::FiveMinutes];

    /// Short name (`1s`, `1m`, `5m`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneSecond => "1s",
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
        }
    }

    /// Bucket width.
    #[must_use]
    pub fn width(self) -> TimeDelta {
        match self {
            Self::OneSecond => TimeDelta::seconds(1),
            Self::OneMinute => TimeDelta::minutes(1),
            Self::FiveMinutes => TimeDelta::minutes(5),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1s" => Ok(Self::OneSecond),
            "1m" | "1min" => Ok(Self::OneMinute),
            "5m" | "5min" => Ok(Self::FiveMinutes),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unsupported timeframe '{other}' (expected 1s, 1m or 5m)"
            ))),
        }
    }
}

/// One OHLCV aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    /// Start of the bucket (inclusive).
    pub bucket_start: DateTime<Utc>,
    /// First price in the bucket.
    pub open: f64,
    /// Highest price in the bucket.
    pub high: f64,
    /// Lowest price in the bucket.
    pub low: f64,
    /// Last price in the bucket.
    pub close: f64,
    /// Sum of traded quantity.
    pub volume: f64,
}

impl Bar {
    fn open_with(bucket_start: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            bucket_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.qty,
        }
    }

    fn absorb(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.qty;
    }
}

/// Ticks belonging to one symbol, in input order.
pub fn ticks_for_symbol<'a>(
    ticks: &'a [Tick],
    symbol: &'a str,
) -> impl Iterator<Item = &'a Tick> + 'a {
    ticks.iter().filter(move |t| t.symbol == symbol)
}

/// Resample one symbol's ticks using a timeframe name (`1s`, `1m`, `5m`).
///
/// # Errors
///
/// Returns `AnalyticsError::InvalidInput` if the timeframe is unsupported.
pub fn resample_ohlcv(ticks: &[Tick], timeframe: &str) -> AnalyticsResult<Vec<Bar>> {
    let timeframe: Timeframe = timeframe.parse()?;
    resample(ticks, timeframe)
}

/// Resample ticks into OHLCV bars.
///
/// Ticks are ordered by timestamp (ties keep input order) before
/// bucketing. The caller is responsible for passing a single symbol.
///
/// # Errors
///
/// Returns `AnalyticsError::InvalidInput` if a timestamp cannot be
/// truncated to the bucket width.
pub fn resample<'a>(
    ticks: impl IntoIterator<Item = &'a Tick>,
    timeframe: Timeframe,
) -> AnalyticsResult<Vec<Bar>> {
    let mut ordered: Vec<&Tick> = ticks.into_iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let width = timeframe.width();
    let mut bars: Vec<Bar> = Vec::new();

    for tick in ordered {
        let bucket_start = tick.timestamp.duration_trunc(width).map_err(|e| {
            AnalyticsError::InvalidInput(format!("cannot bucket {}: {e}", tick.timestamp))
        })?;

        match bars.last_mut() {
            Some(bar) if bar.bucket_start == bucket_start => bar.absorb(tick),
            _ => bars.push(Bar::open_with(bucket_start, tick)),
        }
    }

    Ok(bars)
}
