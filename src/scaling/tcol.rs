//! Triple-collocation scaling.
//!
//! Given three collocated series `x` (reference), `y` and `z` with mutually
//! independent errors, the covariance method estimates the multiplicative factors that
//! bring `y` and `z` into the data space of `x` without assuming any of them is the
//! truth:
//!
//! ```text
//! β_y = cov(x, z) / cov(y, z)
//! β_z = cov(x, y) / cov(z, y)
//!
//! y* = mean(x) + β_y · (y − mean(y))
//! z* = mean(x) + β_z · (z − mean(z))
//! ```
//!
//! Covariances and means are computed on rows where all three series are present.
use nalgebra::DMatrix;

use crate::constants::EPS;
use crate::geoval_errors::GeovalError;

/// Scale `y` and `z` into the data space of `reference`.
///
/// Arguments
/// -----------------
/// * `reference`, `y`, `z` – aligned columns (same length, `NaN` for missing values).
/// * `min_obs` – minimum number of rows where all three are present.
/// * `labels` – names of `y` and `z`, used in errors.
///
/// Return
/// ----------
/// * One result per scaled column, `(y*, z*)`. Both fail with
///   [`GeovalError::InsufficientData`] on a too small overlap; each fails on its own
///   with [`GeovalError::DegenerateScaling`] when its denominator covariance vanishes.
pub fn tcol_scale(
    reference: &[f64],
    y: &[f64],
    z: &[f64],
    min_obs: usize,
    labels: (&str, &str),
) -> (Result<Vec<f64>, GeovalError>, Result<Vec<f64>, GeovalError>) {
    let rows: Vec<usize> = (0..reference.len())
        .filter(|&r| !reference[r].is_nan() && !y[r].is_nan() && !z[r].is_nan())
        .collect();

    if rows.len() < min_obs.max(2) {
        let insufficient = |column: &str| GeovalError::InsufficientData {
            column: column.to_string(),
            available: rows.len(),
            required: min_obs.max(2),
        };
        return (Err(insufficient(labels.0)), Err(insufficient(labels.1)));
    }

    let n = rows.len();
    let data = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => reference[rows[i]],
        1 => y[rows[i]],
        _ => z[rows[i]],
    });
    let means = data.row_mean();
    let centered = DMatrix::from_fn(n, 3, |i, j| data[(i, j)] - means[j]);
    let cov = (centered.transpose() * &centered) / (n as f64 - 1.0);

    let scale = |values: &[f64], own: usize, num: f64, den: f64, column: &str| {
        if den.abs() < EPS * cov[(own, own)].abs().max(f64::MIN_POSITIVE) || !den.is_finite() {
            return Err(GeovalError::DegenerateScaling {
                column: column.to_string(),
                reason: "vanishing cross covariance".into(),
            });
        }
        let beta = num / den;
        Ok(values
            .iter()
            .map(|v| means[0] + beta * (v - means[own]))
            .collect())
    };

    (
        scale(y, 1, cov[(0, 2)], cov[(1, 2)], labels.0),
        scale(z, 2, cov[(0, 1)], cov[(2, 1)], labels.1),
    )
}
