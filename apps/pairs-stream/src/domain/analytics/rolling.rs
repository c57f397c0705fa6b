//! Rolling-Window Statistics
//!
//! Trailing windows with sample (n - 1) standard deviation. Output vectors
//! have the same length as the input; positions before the first full
//! window are `NaN`, as is any window containing `NaN` or having zero
//! variance.

use super::regression::align_tail;
use super::{AnalyticsError, AnalyticsResult, is_flat};

fn check_window(window: usize) -> AnalyticsResult<()> {
    if window < 1 {
        return Err(AnalyticsError::InvalidInput(
            "window must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Mean and sample standard deviation of a window.
fn mean_std(values: &[f64]) -> (f64, f64) {
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Rolling z-score `(x[i] - mean) / std` over a trailing window.
///
/// # Errors
///
/// Returns `InvalidInput` if `window` is 0.
pub fn rolling_zscore(series: &[f64], window: usize) -> AnalyticsResult<Vec<f64>> {
    check_window(window)?;

    let mut out = vec![f64::NAN; series.len()];
    if series.len() < window {
        return Ok(out);
    }

    for (offset, slice) in series.windows(window).enumerate() {
        let i = offset + window - 1;
        let (mean, std) = mean_std(slice);
        if std.is_finite() && std > 0.0 && !is_flat(slice) {
            out[i] = (series[i] - mean) / std;
        }
    }

    Ok(out)
}

/// Rolling Pearson correlation between two series.
///
/// The series are aligned on their most recent common length; the output
/// has that length.
///
/// # Errors
///
/// Returns `InvalidInput` if `window` is 0.
pub fn rolling_correlation(
    series_a: &[f64],
    series_b: &[f64],
    window: usize,
) -> AnalyticsResult<Vec<f64>> {
    check_window(window)?;

    let (a, b) = align_tail(series_a, series_b);
    let mut out = vec![f64::NAN; a.len()];
    if a.len() < window {
        return Ok(out);
    }

    for start in 0..=a.len() - window {
        let wa = &a[start..start + window];
        let wb = &b[start..start + window];
        out[start + window - 1] = pearson(wa, wb);
    }

    Ok(out)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if is_flat(a) || is_flat(b) {
        return f64::NAN;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }

    let denom = (saa * sbb).sqrt();
    if denom > 0.0 && denom.is_finite() {
        (sab / denom).clamp(-1.0, 1.0)
    } else {
        f64::NAN
    }
}

/// Most recent finite value in a series.
#[must_use]
pub fn latest_finite(series: &[f64]) -> Option<f64> {
    series.iter().rev().copied().find(|v| v.is_finite())
}
