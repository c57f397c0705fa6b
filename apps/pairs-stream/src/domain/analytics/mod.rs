//! Analytics Engine
//!
//! Pure, stateless transforms over tick data: OHLCV resampling, hedge-ratio
//! regression, spread, rolling z-score, rolling correlation and the ADF
//! stationarity test.
//!
//! # Numeric conventions
//!
//! - Rolling statistics are trailing windows; outputs before the first full
//!   window are `NaN` and must be filtered before use (see `latest_finite`).
//! - A window with zero variance yields `NaN`.
//! - Pairwise functions align two series on their most recent common length.

mod bars;
mod regression;
mod rolling;
mod stationarity;
mod summary;

pub use bars::{Bar, Timeframe, resample, resample_ohlcv, ticks_for_symbol};
pub use regression::{OlsFit, align_tail, hedge_ratio, ols, spread};
pub use rolling::{latest_finite, rolling_correlation, rolling_zscore};
pub use stationarity::{
    ADF_MIN_OBSERVATIONS, AdfOutcome, adf_stationarity_test, adf_test, mackinnon_p_value,
};
pub use summary::{
    DataQuality, SeriesStats, ZScoreAlert, pct_returns, rolling_volatility, zscore_outliers,
};

/// Errors surfaced to analytics callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyticsError {
    /// Not enough data points for the computation.
    #[error("insufficient data: need at least {required} points, got {available}")]
    InsufficientData {
        /// Points required.
        required: usize,
        /// Points available.
        available: usize,
    },

    /// A parameter or input is outside the supported domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias for analytics operations.
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Relative range below which a window counts as flat.
const FLAT_TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Whether `values` have no spread beyond rounding of their magnitude.
///
/// Equal non-dyadic values (`0.1`, `100.1`) can still leave a tiny nonzero
/// variance after averaging, so flatness is judged on the range. `NaN`
/// entries are ignored.
pub(crate) fn is_flat(values: &[f64]) -> bool {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo <= lo.abs().max(hi.abs()) * FLAT_TOLERANCE
}
