//! Distribution matching.
//!
//! * [`lin_cdf_match`] – piecewise-linear mapping between a fixed set of percentiles
//!   ([`CDF_PERCENTILES`]) of the candidate and of the reference, extrapolated linearly
//!   beyond the outer percentiles.
//! * [`cdf_match`] – full empirical matching: each candidate value is replaced by the
//!   reference quantile at the value's empirical non-exceedance probability.
//!
//! Both fit on the overlap and are applied to every candidate value.
use ordered_float::OrderedFloat;

use crate::constants::CDF_PERCENTILES;
use crate::geoval_errors::GeovalError;

/// Sort a copy of `values` in ascending order.
pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_unstable_by_key(|v| OrderedFloat(*v));
    out
}

/// Quantile of sorted data at probability `q ∈ [0, 1]`, linear between order statistics.
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

/// Percentiles (0–100) of sorted data.
pub fn percentiles(sorted: &[f64], ps: &[f64]) -> Vec<f64> {
    ps.iter().map(|p| quantile(sorted, p / 100.0)).collect()
}

/// Piecewise-linear interpolation through `(xp, fp)` with linear extrapolation.
///
/// `xp` must be strictly increasing with at least two knots.
fn interp_extrapolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    let seg = match xp.partition_point(|k| *k <= x) {
        0 => 0,
        i if i >= n => n - 2,
        i => i - 1,
    };
    let slope = (fp[seg + 1] - fp[seg]) / (xp[seg + 1] - xp[seg]);
    fp[seg] + slope * (x - xp[seg])
}

/// Piecewise-linear percentile matching.
///
/// Arguments
/// -----------------
/// * `reference` / `candidate` – overlapping samples (same length, no `NaN`).
/// * `values` – candidate values to transform (`NaN` is kept).
/// * `column` – label used in errors.
///
/// Return
/// ----------
/// * The transformed values, or [`GeovalError::DegenerateScaling`] when the candidate
///   percentiles collapse to a single value.
pub fn lin_cdf_match(
    reference: &[f64],
    candidate: &[f64],
    values: &[f64],
    column: &str,
) -> Result<Vec<f64>, GeovalError> {
    let perc_ref = percentiles(&sorted(reference), &CDF_PERCENTILES);
    let perc_cand = percentiles(&sorted(candidate), &CDF_PERCENTILES);

    // Repeated candidate percentiles (many equal values) keep their first knot only.
    let mut xp: Vec<f64> = Vec::with_capacity(perc_cand.len());
    let mut fp: Vec<f64> = Vec::with_capacity(perc_cand.len());
    for (c, r) in perc_cand.into_iter().zip(perc_ref) {
        if xp.last().map_or(true, |last| c > *last) {
            xp.push(c);
            fp.push(r);
        }
    }
    if xp.len() < 2 {
        return Err(GeovalError::DegenerateScaling {
            column: column.to_string(),
            reason: "candidate percentiles are all equal".into(),
        });
    }

    Ok(values
        .iter()
        .map(|&v| if v.is_nan() { v } else { interp_extrapolate(v, &xp, &fp) })
        .collect())
}

/// Full empirical CDF matching.
///
/// Values outside the candidate overlap range map to the reference extremes.
pub fn cdf_match(
    reference: &[f64],
    candidate: &[f64],
    values: &[f64],
    column: &str,
) -> Result<Vec<f64>, GeovalError> {
    let sorted_ref = sorted(reference);
    let sorted_cand = sorted(candidate);
    let n = sorted_cand.len();
    if n < 2 || sorted_cand[0] == sorted_cand[n - 1] {
        return Err(GeovalError::DegenerateScaling {
            column: column.to_string(),
            reason: "candidate distribution has no spread".into(),
        });
    }

    let probability = |v: f64| -> f64 {
        let lo = sorted_cand.partition_point(|c| *c < v);
        let hi = sorted_cand.partition_point(|c| *c <= v);
        let pos = if hi > lo {
            // exact hit: middle of the run of equal values
            (lo + hi - 1) as f64 / 2.0
        } else if lo == 0 {
            0.0
        } else if lo == n {
            (n - 1) as f64
        } else {
            let (a, b) = (sorted_cand[lo - 1], sorted_cand[lo]);
            (lo - 1) as f64 + (v - a) / (b - a)
        };
        pos / (n - 1) as f64
    };

    Ok(values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                v
            } else {
                quantile(&sorted_ref, probability(v))
            }
        })
        .collect())
}

#[cfg(test)]
mod cdf_test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_percentiles() {
        let data = sorted(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(percentiles(&data, &[0.0, 50.0, 100.0]), vec![1.0, 3.0, 5.0]);
        let p = percentiles(&data, &[25.0, 10.0]);
        assert_eq!(p[0], 2.0);
        assert_relative_eq!(p[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_interp_extrapolate() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp_extrapolate(0.5, &xp, &fp), 5.0);
        assert_eq!(interp_extrapolate(1.5, &xp, &fp), 20.0);
        assert_eq!(interp_extrapolate(-1.0, &xp, &fp), -10.0);
        assert_eq!(interp_extrapolate(3.0, &xp, &fp), 50.0);
    }

    #[test]
    fn test_lin_cdf_match_linear_relation() {
        let candidate: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let reference: Vec<f64> = candidate.iter().map(|c| 2.0 * c + 10.0).collect();

        let scaled = lin_cdf_match(&reference, &candidate, &[5.0, 60.0, f64::NAN], "b.sm").unwrap();
        assert_relative_eq!(scaled[0], 20.0, epsilon = 1e-9);
        assert_relative_eq!(scaled[1], 130.0, epsilon = 1e-9);
        assert!(scaled[2].is_nan());
    }

    #[test]
    fn test_cdf_match_is_identity_on_itself() {
        let data = vec![0.3, 0.1, 0.25, 0.25, 0.4, 0.05, 0.33, 0.12, 0.2, 0.18];
        let scaled = cdf_match(&data, &data, &data, "a.sm").unwrap();
        for (s, d) in scaled.iter().zip(&data) {
            assert_relative_eq!(*s, *d, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cdf_match_monotone_transform() {
        let candidate: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let reference: Vec<f64> = candidate.iter().map(|c| c * c).collect();
        let scaled = cdf_match(&reference, &candidate, &[3.0, 3.5, 100.0], "b.sm").unwrap();
        assert_relative_eq!(scaled[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(scaled[1], 12.5, epsilon = 1e-12);
        assert_relative_eq!(scaled[2], 400.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_candidates() {
        let flat = vec![1.0; 12];
        let reference: Vec<f64> = (0..12).map(|i| i as f64).collect();
        assert!(matches!(
            lin_cdf_match(&reference, &flat, &flat, "b.sm"),
            Err(GeovalError::DegenerateScaling { .. })
        ));
        assert!(matches!(
            cdf_match(&reference, &flat, &flat, "b.sm"),
            Err(GeovalError::DegenerateScaling { .. })
        ));
    }
}
