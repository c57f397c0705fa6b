//! Augmented Dickey-Fuller Test
//!
//! Tests the unit-root null hypothesis against a stationary alternative.
//!
//! # Algorithm
//!
//! 1. Drop non-finite points; require at least `ADF_MIN_OBSERVATIONS`.
//! 2. `maxlag = min(ceil(12 * (n / 100)^(1/4)), n / 2 - 2)`.
//! 3. For each lag `p` in `0..=maxlag`, regress
//!    `Δx[t] = c + γ x[t-1] + Σ φ_i Δx[t-i] + ε` on the sample trimmed for
//!    `maxlag` and keep the lag with the lowest AIC (ties go to the
//!    shorter lag).
//! 4. Refit with the chosen lag on the full sample it allows. The test
//!    statistic is the t-value of `γ`.
//! 5. Map the statistic to a p-value with MacKinnon's (1994) response
//!    surface for the constant-only case.
//!
//! More negative statistics (smaller p-values) are stronger evidence of
//! stationarity.

use serde::Serialize;

use super::regression::{OlsFit, ols};
use super::{AnalyticsError, AnalyticsResult};

/// Minimum number of valid points for the test.
pub const ADF_MIN_OBSERVATIONS: usize = 20;

// MacKinnon (1994) constant-only coefficients, one cointegrating variable.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038_269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.932_02, -0.127_45, -0.010_368];

/// Full ADF result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdfOutcome {
    /// t-statistic of the lagged level coefficient.
    pub statistic: f64,
    /// MacKinnon approximate p-value.
    pub p_value: f64,
    /// Number of lagged differences in the final regression.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
}

impl AdfOutcome {
    /// Whether the unit root is rejected at significance `alpha`.
    #[must_use]
    pub fn is_stationary(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// ADF p-value for a series.
///
/// # Errors
///
/// - `InsufficientData` if fewer than 20 finite points remain.
/// - `InvalidInput` if the regression is degenerate (e.g. a constant series).
pub fn adf_stationarity_test(series: &[f64]) -> AnalyticsResult<f64> {
    adf_test(series).map(|outcome| outcome.p_value)
}

/// Run the ADF test with AIC lag selection.
///
/// # Errors
///
/// Same as [`adf_stationarity_test`].
pub fn adf_test(series: &[f64]) -> AnalyticsResult<AdfOutcome> {
    let x: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();

    if x.len() < ADF_MIN_OBSERVATIONS {
        return Err(AnalyticsError::InsufficientData {
            required: ADF_MIN_OBSERVATIONS,
            available: x.len(),
        });
    }

    if x.iter().all(|v| (v - x[0]).abs() == 0.0) {
        return Err(AnalyticsError::InvalidInput(
            "series is constant".to_string(),
        ));
    }

    let max_lag = max_lag(x.len());
    let diffs: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = fit_lagged(&x, &diffs, lag, max_lag) else {
            continue;
        };
        if !fit.aic.is_finite() {
            continue;
        }
        if best.is_none_or(|(_, aic)| fit.aic < aic) {
            best = Some((lag, fit.aic));
        }
    }

    let used_lag = best.map_or(0, |(lag, _)| lag);
    let fit = fit_lagged(&x, &diffs, used_lag, used_lag)
        .ok_or_else(|| AnalyticsError::InvalidInput("singular ADF regression".to_string()))?;

    let statistic = fit.t_value(0);
    if !statistic.is_finite() {
        return Err(AnalyticsError::InvalidInput(
            "degenerate ADF regression".to_string(),
        ));
    }

    Ok(AdfOutcome {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag,
        nobs: fit.nobs,
    })
}

/// Schwert's rule, capped so the regression stays identified.
fn max_lag(n: usize) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    schwert.min((n / 2).saturating_sub(2))
}

/// Regress `Δx[j]` on `x[j]` and `lag` lagged differences for rows
/// `j in trim..diffs.len()`.
fn fit_lagged(x: &[f64], diffs: &[f64], lag: usize, trim: usize) -> Option<OlsFit> {
    let rows = trim..diffs.len();
    let y: Vec<f64> = diffs[rows.clone()].to_vec();

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(lag + 1);
    columns.push(x[rows.clone()].to_vec());
    for i in 1..=lag {
        columns.push(rows.clone().map(|j| diffs[j - i]).collect());
    }

    ols(&y, &columns)
}

/// MacKinnon approximate p-value for an ADF statistic (constant, N = 1).
#[must_use]
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic.is_nan() {
        return f64::NAN;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }

    let coefficients: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };

    let z = coefficients
        .iter()
        .rev()
        .fold(0.0_f64, |acc, c| acc.mul_add(statistic, *c));

    norm_cdf(z).clamp(0.0, 1.0)
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}
