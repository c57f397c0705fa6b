//! Summary Statistics and Alert Policy

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::{AnalyticsError, AnalyticsResult, is_flat};
use crate::domain::tick::Tick;

/// Trading days per year used to annualize volatility.
const TRADING_DAYS: f64 = 252.0;

/// Minimum points before outlier detection runs.
const MIN_OUTLIER_POINTS: usize = 10;

// =============================================================================
// Z-Score Alert
// =============================================================================

/// Alert status derived from the latest z-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZScoreAlert {
    /// `|z|` reached the threshold.
    Alert {
        /// Latest z-score.
        zscore: f64,
    },
    /// `|z|` below the threshold.
    Normal {
        /// Latest z-score.
        zscore: f64,
    },
    /// No finite z-score available yet.
    NoSignal,
}

impl ZScoreAlert {
    /// Classify the latest z-score against an absolute threshold.
    ///
    /// `None` and `NaN` both map to `NoSignal`; they never alert.
    #[must_use]
    pub fn evaluate(latest: Option<f64>, threshold: f64) -> Self {
        match latest {
            Some(z) if z.is_finite() => {
                if z.abs() >= threshold {
                    Self::Alert { zscore: z }
                } else {
                    Self::Normal { zscore: z }
                }
            }
            _ => Self::NoSignal,
        }
    }

    /// Whether this is an alert.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::Alert { .. })
    }
}

// =============================================================================
// Series Statistics
// =============================================================================

/// Descriptive statistics over the finite values of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    /// Number of finite values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (`NaN` below two values).
    pub std: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// Last finite value.
    pub latest: f64,
}

impl SeriesStats {
    /// Compute statistics, or `None` if the series has no finite values.
    #[must_use]
    pub fn from_series(series: &[f64]) -> Option<Self> {
        let values: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
        let latest = *values.last()?;

        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() < 2 {
            f64::NAN
        } else if is_flat(&values) {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };

        Some(Self {
            count: values.len(),
            mean,
            std,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            latest,
        })
    }
}

/// Coverage summary of a tick set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Total ticks.
    pub total_records: usize,
    /// Distinct symbols.
    pub unique_symbols: usize,
    /// Earliest tick time.
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Latest tick time.
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl DataQuality {
    /// Summarize a tick set.
    #[must_use]
    pub fn from_ticks(ticks: &[Tick]) -> Self {
        let symbols: HashSet<&str> = ticks.iter().map(|t| t.symbol.as_str()).collect();
        Self {
            total_records: ticks.len(),
            unique_symbols: symbols.len(),
            first_timestamp: ticks.iter().map(|t| t.timestamp).min(),
            last_timestamp: ticks.iter().map(|t| t.timestamp).max(),
        }
    }

    /// Span between the first and last tick.
    #[must_use]
    pub fn time_range(&self) -> Option<TimeDelta> {
        Some(self.last_timestamp? - self.first_timestamp?)
    }
}

// =============================================================================
// Returns and Volatility
// =============================================================================

/// Simple percentage returns `p[i] / p[i-1] - 1`, non-finite results dropped.
#[must_use]
pub fn pct_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect()
}

/// Rolling annualized volatility of a return series.
///
/// Returns an empty vector when there are fewer returns than `window`.
///
/// # Errors
///
/// Returns `InvalidInput` if `window` is 0.
pub fn rolling_volatility(returns: &[f64], window: usize) -> AnalyticsResult<Vec<f64>> {
    if window < 1 {
        return Err(AnalyticsError::InvalidInput(
            "window must be at least 1".to_string(),
        ));
    }
    if returns.len() < window {
        return Ok(Vec::new());
    }

    let annualize = TRADING_DAYS.sqrt();
    let mut out = vec![f64::NAN; returns.len()];
    for (offset, slice) in returns.windows(window).enumerate() {
        match SeriesStats::from_series(slice) {
            Some(stats) if stats.count == window => {
                out[offset + window - 1] = stats.std * annualize;
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Flag points whose full-sample z-score exceeds `threshold`.
///
/// Returns an empty vector for series shorter than 10 points.
#[must_use]
pub fn zscore_outliers(series: &[f64], threshold: f64) -> Vec<bool> {
    if series.len() < MIN_OUTLIER_POINTS {
        return Vec::new();
    }
    let Some(stats) = SeriesStats::from_series(series) else {
        return vec![false; series.len()];
    };
    if stats.std.is_nan() || stats.std <= 0.0 {
        return vec![false; series.len()];
    }

    series
        .iter()
        .map(|v| ((v - stats.mean) / stats.std).abs() > threshold)
        .collect()
}
