//! Least-Squares Regression
//!
//! Hedge ratio and spread for a pair of price series, plus a small
//! multi-regressor OLS used by the ADF test.

use super::{AnalyticsError, AnalyticsResult, is_flat};

/// Minimum points for a hedge-ratio fit.
const MIN_HEDGE_POINTS: usize = 2;

/// Align two series on their most recent common length.
///
/// Returns the trailing `min(a.len(), b.len())` points of each.
#[must_use]
pub fn align_tail<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    (&a[a.len() - n..], &b[b.len() - n..])
}

/// Hedge ratio of `series_a` on `series_b`.
///
/// Fits `a = alpha + beta * b` by ordinary least squares over the aligned
/// series and returns `beta`.
///
/// # Errors
///
/// - `InsufficientData` if fewer than 2 aligned points exist.
/// - `InvalidInput` if `series_b` is constant over the aligned window.
pub fn hedge_ratio(series_a: &[f64], series_b: &[f64]) -> AnalyticsResult<f64> {
    let (a, b) = align_tail(series_a, series_b);

    if a.len() < MIN_HEDGE_POINTS {
        return Err(AnalyticsError::InsufficientData {
            required: MIN_HEDGE_POINTS,
            available: a.len(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (sxy, sxx) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(sxy, sxx), (&ya, &xb)| {
            let dx = xb - mean_b;
            (sxy + dx * (ya - mean_a), sxx + dx * dx)
        });

    if is_flat(b) || sxx == 0.0 || !sxx.is_finite() {
        return Err(AnalyticsError::InvalidInput(
            "hedge ratio regressor has zero variance".to_string(),
        ));
    }

    Ok(sxy / sxx)
}

/// Spread `a[i] - hedge_ratio * b[i]` over the aligned series.
#[must_use]
pub fn spread(series_a: &[f64], series_b: &[f64], hedge_ratio: f64) -> Vec<f64> {
    let (a, b) = align_tail(series_a, series_b);
    a.iter().zip(b).map(|(ya, xb)| ya - hedge_ratio * xb).collect()
}

// =============================================================================
// General OLS
// =============================================================================

/// Result of an OLS fit with an intercept.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Slope coefficients, one per regressor column.
    pub coefficients: Vec<f64>,
    /// Standard errors of the slope coefficients.
    pub std_errors: Vec<f64>,
    /// Intercept.
    pub intercept: f64,
    /// Sum of squared residuals.
    pub ssr: f64,
    /// Number of observations.
    pub nobs: usize,
    /// Akaike information criterion (Gaussian log-likelihood).
    pub aic: f64,
}

impl OlsFit {
    /// t-statistic of slope coefficient `i`.
    #[must_use]
    pub fn t_value(&self, i: usize) -> f64 {
        self.coefficients[i] / self.std_errors[i]
    }
}

/// Fit `y = c + X b` by ordinary least squares.
///
/// `columns` holds the regressors (excluding the intercept), each with the
/// same length as `y`. Regressors are demeaned before solving the normal
/// equations, which keeps price-level inputs well conditioned.
///
/// Returns `None` when the system is underdetermined or singular.
#[must_use]
pub fn ols(y: &[f64], columns: &[Vec<f64>]) -> Option<OlsFit> {
    let n = y.len();
    let k = columns.len();
    let params = k + 1;

    if n <= params || columns.iter().any(|c| c.len() != n) {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let n_f = n as f64;
    let y_mean = y.iter().sum::<f64>() / n_f;
    let means: Vec<f64> = columns.iter().map(|c| c.iter().sum::<f64>() / n_f).collect();

    let centered: Vec<Vec<f64>> = columns
        .iter()
        .zip(&means)
        .map(|(c, m)| c.iter().map(|v| v - m).collect())
        .collect();
    let y_centered: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for i in 0..k {
        for j in i..k {
            let dot = dot(&centered[i], &centered[j]);
            xtx[i][j] = dot;
            xtx[j][i] = dot;
        }
        xty[i] = dot(&centered[i], &y_centered);
    }

    let inverse = invert(xtx)?;
    let coefficients: Vec<f64> = (0..k).map(|i| dot(&inverse[i], &xty)).collect();
    let intercept = y_mean - dot(&coefficients, &means);

    let ssr: f64 = (0..n)
        .map(|t| {
            let fitted: f64 = (0..k).map(|i| coefficients[i] * centered[i][t]).sum();
            let residual = y_centered[t] - fitted;
            residual * residual
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let sigma2 = ssr / (n - params) as f64;
    let std_errors: Vec<f64> = (0..k).map(|i| (sigma2 * inverse[i][i]).sqrt()).collect();

    #[allow(clippy::cast_precision_loss)]
    let aic = n_f.mul_add(
        (2.0 * std::f64::consts::PI).ln() + (ssr / n_f).ln() + 1.0,
        2.0 * params as f64,
    );

    Some(OlsFit {
        coefficients,
        std_errors,
        intercept,
        ssr,
        nobs: n,
        aic,
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(mut m: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let k = m.len();
    let scale = (0..k).map(|i| m[i][i].abs()).fold(0.0_f64, f64::max);
    #[allow(clippy::cast_precision_loss)]
    let tolerance = scale * f64::EPSILON * (k.max(1) as f64) * 16.0;

    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot_row][col].abs() <= tolerance {
            return None;
        }
        m.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = m[col][col];
        for j in 0..k {
            m[col][j] /= pivot;
            inv[col][j] /= pivot;
        }

        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                m[row][j] -= factor * m[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn identical_series_have_unit_hedge_ratio_and_zero_spread() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + f64::from(i) * 0.5).collect();

        let beta = hedge_ratio(&prices, &prices).unwrap();
        assert!((beta - 1.0).abs() < 1e-9);

        let s = spread(&prices, &prices, beta);
        assert_eq!(s.len(), prices.len());
        assert!(s.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn recovers_linear_relationship() {
        let b: Vec<f64> = (0..40).map(|i| 20.0 + (f64::from(i) * 0.3).sin()).collect();
        let a: Vec<f64> = b.iter().map(|x| 3.0 + 2.5 * x).collect();

        let beta = hedge_ratio(&a, &b).unwrap();
        assert!((beta - 2.5).abs() < 1e-9);
    }

    #[test]
    fn aligns_on_most_recent_points() {
        let a = vec![1000.0, 1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];

        let (ta, tb) = align_tail(&a, &b);
        assert_eq!(ta, &[1.0, 2.0, 3.0]);
        assert_eq!(tb, &[2.0, 4.0, 6.0]);

        let beta = hedge_ratio(&a, &b).unwrap();
        assert!((beta - 0.5).abs() < 1e-12);
    }

    #[test]
    fn too_few_points() {
        assert_eq!(
            hedge_ratio(&[1.0], &[1.0, 2.0]),
            Err(AnalyticsError::InsufficientData {
                required: 2,
                available: 1
            })
        );
    }

    #[test_case(5.0; "integer")]
    #[test_case(0.1; "tenth")]
    #[test_case(100.1; "price level")]
    fn constant_regressor_is_invalid(level: f64) {
        let result = hedge_ratio(&[1.0, 2.0, 3.0], &[level; 3]);
        assert!(matches!(result, Err(AnalyticsError::InvalidInput(_))), "{result:?}");
    }

    #[test]
    fn ols_two_regressors() {
        let x1: Vec<f64> = (0..30).map(f64::from).collect();
        let x2: Vec<f64> = (0..30).map(|i| (f64::from(i) * 0.7).cos()).collect();
        let noise: Vec<f64> = (0..30).map(|i| (f64::from(i) * 1.3).sin() * 0.01).collect();
        let y: Vec<f64> = (0..30)
            .map(|i| 1.5 + 0.2 * x1[i] - 3.0 * x2[i] + noise[i])
            .collect();

        let fit = ols(&y, &[x1, x2]).unwrap();
        assert!((fit.coefficients[0] - 0.2).abs() < 1e-2);
        assert!((fit.coefficients[1] + 3.0).abs() < 1e-1);
        assert!((fit.intercept - 1.5).abs() < 1e-1);
        assert_eq!(fit.nobs, 30);
        assert!(fit.std_errors.iter().all(|se| se.is_finite() && *se > 0.0));
    }

    #[test]
    fn ols_rejects_collinear_columns() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| v * 2.0).collect();
        assert!(ols(&y, &[x.clone(), x]).is_none());
    }

    #[test]
    fn ols_rejects_underdetermined() {
        assert!(ols(&[1.0, 2.0], &[vec![1.0, 2.0]]).is_none());
    }
}
