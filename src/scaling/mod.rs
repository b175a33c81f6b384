//! # Data-space scaling
//!
//! Rescales the columns of a [`CombinedTable`] into the data space of one **scaling
//! reference column**, so that metric calculators compare quantities with the same
//! units, bias and dynamic range.
//!
//! ## Methods
//!
//! | name             | transform of a candidate value `v`                                    | min. samples |
//! |------------------|-----------------------------------------------------------------------|--------------|
//! | `min_max`        | `(v − min_c) / (max_c − min_c) · (max_r − min_r) + min_r`             | 2            |
//! | `mean_std`       | `(v − μ_c) / σ_c · σ_r + μ_r` (population std)                        | 2            |
//! | `linreg`         | `a + b·v`, `(a, b)` the OLS fit of the reference on the candidate     | 2            |
//! | `lin_cdf_match`  | piecewise-linear percentile matching ([`cdf::lin_cdf_match`])         | 10           |
//! | `cdf_match`      | full empirical CDF matching ([`cdf::cdf_match`])                      | 10           |
//! | `tcol`           | triple-collocation covariance scaling ([`tcol::tcol_scale`])          | 10           |
//!
//! Every parameter is fitted on the **overlap**: the rows where both the reference
//! and the candidate hold a value (all three columns for `tcol`). The fitted transform
//! is then applied to every value of the candidate column.
//!
//! ## Failures
//!
//! Scaling failures are local to one column. A column whose overlap is smaller than
//! the method's minimum, or whose spread vanishes, keeps its unscaled values and is
//! recorded in [`ScaledTable::failures`]; the other columns of the table are not
//! affected.
//!
//! ## See also
//! ------------
//! * [`crate::validation::Validation`] – builds the [`Scaler`] from a [`ScalingConfig`].
use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::constants::{
    EPS, MIN_OBS_CDF_SCALING, MIN_OBS_LINEAR_SCALING, MIN_OBS_TCOL_SCALING,
};
use crate::geoval_errors::GeovalError;
use crate::matching::{ColumnId, CombinedTable};

pub mod cdf;
pub mod tcol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalingMethod {
    MinMax,
    MeanStd,
    LinReg,
    LinCdfMatch,
    CdfMatch,
    TripleCollocation,
}

impl ScalingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ScalingMethod::MinMax => "min_max",
            ScalingMethod::MeanStd => "mean_std",
            ScalingMethod::LinReg => "linreg",
            ScalingMethod::LinCdfMatch => "lin_cdf_match",
            ScalingMethod::CdfMatch => "cdf_match",
            ScalingMethod::TripleCollocation => "tcol",
        }
    }

    /// Minimum overlap used when neither the scaling configuration nor the
    /// validation parameters override it.
    pub fn default_min_obs(&self) -> usize {
        match self {
            ScalingMethod::MinMax | ScalingMethod::MeanStd | ScalingMethod::LinReg => {
                MIN_OBS_LINEAR_SCALING
            }
            ScalingMethod::LinCdfMatch | ScalingMethod::CdfMatch => MIN_OBS_CDF_SCALING,
            ScalingMethod::TripleCollocation => MIN_OBS_TCOL_SCALING,
        }
    }

    /// Whether each candidate is scaled against the reference alone.
    pub fn is_pairwise(&self) -> bool {
        !matches!(self, ScalingMethod::TripleCollocation)
    }
}

impl FromStr for ScalingMethod {
    type Err = GeovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min_max" => Ok(ScalingMethod::MinMax),
            "mean_std" => Ok(ScalingMethod::MeanStd),
            "linreg" => Ok(ScalingMethod::LinReg),
            "lin_cdf_match" => Ok(ScalingMethod::LinCdfMatch),
            "cdf_match" => Ok(ScalingMethod::CdfMatch),
            "tcol" => Ok(ScalingMethod::TripleCollocation),
            other => Err(GeovalError::InvalidScalingMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ScalingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User-facing scaling configuration.
///
/// `reference` names the scaling reference dataset. Its first registered column is used
/// unless `reference_column` names another one. `min_obs` overrides the method default.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingConfig {
    pub method: ScalingMethod,
    pub reference: String,
    pub reference_column: Option<String>,
    pub min_obs: Option<usize>,
}

impl ScalingConfig {
    pub fn new(method: ScalingMethod, reference: &str) -> Self {
        ScalingConfig {
            method,
            reference: reference.to_string(),
            reference_column: None,
            min_obs: None,
        }
    }

    pub fn with_reference_column(mut self, column: &str) -> Self {
        self.reference_column = Some(column.to_string());
        self
    }

    pub fn with_min_obs(mut self, min_obs: usize) -> Self {
        self.min_obs = Some(min_obs);
        self
    }
}

/// A combined table after scaling, with the columns that could not be scaled.
#[derive(Debug, Default)]
pub struct ScaledTable {
    pub table: CombinedTable,
    pub failures: Vec<(ColumnId, GeovalError)>,
}

impl ScaledTable {
    pub fn unscaled(table: CombinedTable) -> Self {
        ScaledTable {
            table,
            failures: Vec::new(),
        }
    }

    /// The scaling failure recorded for `id`, if any.
    pub fn failure(&self, id: &ColumnId) -> Option<&GeovalError> {
        self.failures
            .iter()
            .find(|(c, _)| c == id)
            .map(|(_, err)| err)
    }
}

/// Resolved scaling stage: method, reference column and minimum overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    method: ScalingMethod,
    reference: ColumnId,
    min_obs: usize,
}

impl Scaler {
    pub fn new(method: ScalingMethod, reference: ColumnId, min_obs: usize) -> Self {
        Scaler {
            method,
            reference,
            min_obs,
        }
    }

    pub fn method(&self) -> ScalingMethod {
        self.method
    }

    pub fn reference(&self) -> &ColumnId {
        &self.reference
    }

    pub fn min_obs(&self) -> usize {
        self.min_obs
    }

    /// Scale every non-reference column of `table` into the reference's data space.
    ///
    /// Arguments
    /// -----------------
    /// * `table` – a combined table; if it does not hold the reference column it is
    ///   returned unscaled.
    ///
    /// Return
    /// ----------
    /// * A [`ScaledTable`] with the scaled columns and the per-column failures.
    pub fn scale(&self, table: CombinedTable) -> ScaledTable {
        let Some(reference) = table.column(&self.reference).map(<[f64]>::to_vec) else {
            return ScaledTable::unscaled(table);
        };

        let candidates: Vec<ColumnId> = table
            .column_ids()
            .filter(|id| **id != self.reference)
            .cloned()
            .collect();

        let mut scaled = ScaledTable::unscaled(table);
        let outcomes = if self.method.is_pairwise() {
            candidates
                .iter()
                .map(|id| {
                    let values = scaled.table.column(id).unwrap_or_default();
                    let label = id.to_string();
                    (
                        id.clone(),
                        scale_column(&reference, values, self.method, self.min_obs, &label),
                    )
                })
                .collect()
        } else {
            self.scale_triplet(&reference, &candidates, &scaled.table)
        };

        for (id, outcome) in outcomes {
            match outcome {
                Ok(values) => scaled.table.replace_column(&id, values),
                Err(err) => {
                    warn!(column = %id, method = %self.method, %err, "column left unscaled");
                    scaled.failures.push((id, err));
                }
            }
        }
        scaled
    }

    fn scale_triplet(
        &self,
        reference: &[f64],
        candidates: &[ColumnId],
        table: &CombinedTable,
    ) -> Vec<(ColumnId, Result<Vec<f64>, GeovalError>)> {
        let [y_id, z_id] = candidates else {
            return candidates
                .iter()
                .map(|id| {
                    let err = GeovalError::IncompatibleScaling {
                        method: self.method.to_string(),
                        reason: format!("needs exactly 3 columns, got {}", candidates.len() + 1),
                    };
                    (id.clone(), Err(err))
                })
                .collect();
        };

        let y = table.column(y_id).unwrap_or_default();
        let z = table.column(z_id).unwrap_or_default();
        let (y_label, z_label) = (y_id.to_string(), z_id.to_string());
        let (ys, zs) = tcol::tcol_scale(reference, y, z, self.min_obs, (&y_label, &z_label));
        vec![(y_id.clone(), ys), (z_id.clone(), zs)]
    }
}

/// Scale one candidate column against the reference with a pairwise method.
///
/// Arguments
/// -----------------
/// * `reference` / `candidate` – aligned columns, `NaN` for missing values.
/// * `method` – any pairwise [`ScalingMethod`].
/// * `min_obs` – minimum overlap.
/// * `column` – label of the candidate used in errors.
///
/// Return
/// ----------
/// * The scaled candidate (same length, `NaN` kept), or
///   [`GeovalError::InsufficientData`], [`GeovalError::DegenerateScaling`], or
///   [`GeovalError::IncompatibleScaling`] for a non-pairwise method.
pub fn scale_column(
    reference: &[f64],
    candidate: &[f64],
    method: ScalingMethod,
    min_obs: usize,
    column: &str,
) -> Result<Vec<f64>, GeovalError> {
    let (ref_overlap, cand_overlap): (Vec<f64>, Vec<f64>) = reference
        .iter()
        .zip(candidate)
        .filter(|(r, c)| !r.is_nan() && !c.is_nan())
        .map(|(r, c)| (*r, *c))
        .unzip();

    let required = min_obs.max(MIN_OBS_LINEAR_SCALING);
    if cand_overlap.len() < required {
        return Err(GeovalError::InsufficientData {
            column: column.to_string(),
            available: cand_overlap.len(),
            required,
        });
    }

    let degenerate = |reason: &str| GeovalError::DegenerateScaling {
        column: column.to_string(),
        reason: reason.to_string(),
    };
    let apply = |f: &dyn Fn(f64) -> f64| -> Vec<f64> { candidate.iter().map(|v| f(*v)).collect() };

    match method {
        ScalingMethod::MinMax => {
            let (rmin, rmax) = min_max(&ref_overlap);
            let (cmin, cmax) = min_max(&cand_overlap);
            if vanishes(cmax - cmin, cmax.abs().max(cmin.abs())) {
                return Err(degenerate("candidate range is zero"));
            }
            Ok(apply(&|v| (v - cmin) / (cmax - cmin) * (rmax - rmin) + rmin))
        }
        ScalingMethod::MeanStd => {
            let (rmean, rstd) = mean_std(&ref_overlap);
            let (cmean, cstd) = mean_std(&cand_overlap);
            if vanishes(cstd, cmean) {
                return Err(degenerate("candidate standard deviation is zero"));
            }
            Ok(apply(&|v| (v - cmean) / cstd * rstd + rmean))
        }
        ScalingMethod::LinReg => {
            let (intercept, slope) = linear_fit(&cand_overlap, &ref_overlap)
                .ok_or_else(|| degenerate("candidate has no spread for a regression"))?;
            Ok(apply(&|v| intercept + slope * v))
        }
        ScalingMethod::LinCdfMatch => cdf::lin_cdf_match(&ref_overlap, &cand_overlap, candidate, column),
        ScalingMethod::CdfMatch => cdf::cdf_match(&ref_overlap, &cand_overlap, candidate, column),
        ScalingMethod::TripleCollocation => Err(GeovalError::IncompatibleScaling {
            method: method.to_string(),
            reason: "triple collocation scales three columns together".into(),
        }),
    }
}

fn vanishes(spread: f64, magnitude: f64) -> bool {
    spread.is_nan() || spread <= EPS * magnitude.abs()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Ordinary least squares `y = a + b·x` solved through the SVD of the design matrix.
fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let (mean_x, std_x) = mean_std(x);
    if vanishes(std_x, mean_x) {
        return None;
    }

    let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let rhs = DVector::from_column_slice(y);
    let coeffs = design.svd(true, true).solve(&rhs, EPS).ok()?;
    Some((coeffs[0], coeffs[1]))
}
