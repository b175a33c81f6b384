//! # Validation setup
//!
//! This module holds the two configuration layers of a validation run:
//!
//! * [`ValidationParams`] – numeric knobs (matching window, neighbour distance bound,
//!   validation period, scaling sample threshold) with a validated fluent builder.
//! * [`Validation`] – the immutable validation instance: dataset registrations,
//!   references, scaling stage, metric bindings and the precomputed
//!   [`CombinationPlan`]. It is built once with [`Validation::builder`], then used
//!   to process any number of jobs ([`Validation::process`],
//!   [`Validation::process_jobs`]).
//!
//! ## Setup-time checks
//!
//! [`ValidationBuilder::build`] raises every configuration error before the first job:
//!
//! | check                                                        | error                                     |
//! |--------------------------------------------------------------|-------------------------------------------|
//! | dataset names unique, columns non-empty and known            | `DuplicateDataset`, `EmptyColumns`, `UnknownColumns` |
//! | masking datasets have exactly one column                     | `InvalidMaskingDataset`                   |
//! | spatial, temporal and scaling references are registered      | `UnknownReference`                        |
//! | every non-reference dataset can be located                   | `UnresolvableLocation`                    |
//! | bindings valid, unique, non-overlapping                      | `InvalidBinding`, `DuplicateBinding`, `OverlappingBindings` |
//! | calculator arity equals `k`                                  | `ArityMismatch`                           |
//! | triple collocation only on groups of three columns           | `IncompatibleScaling`                     |
//! | parameter values                                             | `InvalidParameter`                        |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geoval::datasets::DatasetConfig;
//! use geoval::scaling::{ScalingConfig, ScalingMethod};
//! use geoval::validation::{Validation, ValidationParams};
//! # use geoval::datasets::DatasetReader;
//! # use geoval::metrics::MetricsCalculator;
//! # let ismn: Arc<dyn DatasetReader> = unimplemented!();
//! # let ascat: Arc<dyn DatasetReader> = unimplemented!();
//! # let pearson: Arc<dyn MetricsCalculator> = unimplemented!();
//!
//! let validation = Validation::builder()
//!     .dataset(DatasetConfig::new("ismn", ismn, &["soil_moisture"]))
//!     .dataset(DatasetConfig::new("ascat", ascat, &["sm"]))
//!     .spatial_reference("ismn")
//!     .temporal_reference("ismn")
//!     .scaling(ScalingConfig::new(ScalingMethod::MeanStd, "ismn"))
//!     .metrics_calculator((2, 2), pearson)
//!     .params(ValidationParams::builder().max_distance_m(25_000.0).build().unwrap())
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## See also
//! ------------
//! * [`process`] – the per-job state machine.
//! * [`results`] – job results and sinks.
use std::fmt;
use std::sync::Arc;

use hifitime::{Duration, Epoch};

use crate::anomaly::AnomalyMethod;
use crate::combinations::{Binding, CombinationPlan};
use crate::constants::{Meter, MIN_OBS_LINEAR_SCALING};
use crate::datasets::data_manager::DataManager;
use crate::datasets::DatasetConfig;
use crate::geoval_errors::GeovalError;
use crate::matching::masking::MaskingStage;
use crate::matching::{ColumnId, TemporalMatcher};
use crate::metrics::MetricsCalculator;
use crate::scaling::{Scaler, ScalingConfig, ScalingMethod};
use crate::time::{default_temporal_window, epoch_to_mjd};

pub mod process;
#[cfg(feature = "progress")]
pub mod progress_bar;
pub mod results;

/// Numeric parameters of a validation run.
///
/// Fields
/// -----------------
/// * `temporal_window` – half-width of the temporal matching window (default 1 hour).
/// * `max_distance_m` – largest accepted distance (meters) between a job and the
///   nearest grid point of another dataset; `None` accepts any neighbour.
/// * `period` – `[start, end]` every reading is trimmed to; `None` keeps all data.
/// * `scaling_min_obs` – minimum scaling overlap for every method, overriding the
///   per-method defaults (2 for linear methods, 10 for CDF matching and triple
///   collocation). A value set on the [`ScalingConfig`] takes precedence.
/// * `anomaly` – optional anomaly pre-processing of the scaled columns before the
///   metrics are computed; `None` hands the scaled values to the calculators.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationParams {
    pub temporal_window: Duration,
    pub max_distance_m: Option<Meter>,
    pub period: Option<(Epoch, Epoch)>,
    pub scaling_min_obs: Option<usize>,
    pub anomaly: Option<AnomalyMethod>,
}

impl ValidationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ValidationParamsBuilder {
        ValidationParamsBuilder::new()
    }
}

impl Default for ValidationParams {
    fn default() -> Self {
        ValidationParams {
            temporal_window: default_temporal_window(),
            max_distance_m: None,
            period: None,
            scaling_min_obs: None,
            anomaly: None,
        }
    }
}

/// Builder for [`ValidationParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationParamsBuilder {
    params: ValidationParams,
}

impl ValidationParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temporal_window(mut self, v: Duration) -> Self {
        self.params.temporal_window = v;
        self
    }

    pub fn max_distance_m(mut self, v: Meter) -> Self {
        self.params.max_distance_m = Some(v);
        self
    }

    pub fn period(mut self, start: Epoch, end: Epoch) -> Self {
        self.params.period = Some((start, end));
        self
    }

    pub fn scaling_min_obs(mut self, v: usize) -> Self {
        self.params.scaling_min_obs = Some(v);
        self
    }

    pub fn anomaly(mut self, method: AnomalyMethod) -> Self {
        self.params.anomaly = Some(method);
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `temporal_window > 0`.
    /// * `max_distance_m > 0` when set (and not `NaN`).
    /// * `start <= end` for the period.
    /// * `scaling_min_obs >= 2` when set: no method can fit on fewer points.
    /// * a positive anomaly window when set.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`GeovalError::InvalidParameter`].
    pub fn build(self) -> Result<ValidationParams, GeovalError> {
        let p = &self.params;

        if p.temporal_window <= Duration::ZERO {
            return Err(GeovalError::InvalidParameter(
                "temporal_window must be > 0".into(),
            ));
        }
        if let Some(d) = p.max_distance_m {
            if d.is_nan() || d <= 0.0 {
                return Err(GeovalError::InvalidParameter(
                    "max_distance_m must be > 0".into(),
                ));
            }
        }
        if let Some((start, end)) = p.period {
            if start > end {
                return Err(GeovalError::InvalidParameter(
                    "period start must not be after its end".into(),
                ));
            }
        }
        if let Some(n) = p.scaling_min_obs {
            if n < MIN_OBS_LINEAR_SCALING {
                return Err(GeovalError::InvalidParameter(format!(
                    "scaling_min_obs must be >= {MIN_OBS_LINEAR_SCALING}"
                )));
            }
        }
        if let Some(anomaly) = &p.anomaly {
            anomaly.validate()?;
        }

        Ok(self.params)
    }
}

impl fmt::Display for ValidationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_distance = self
            .max_distance_m
            .map_or("none".to_string(), |d| format!("{d:.1} m"));
        let period = self
            .period
            .map_or("none".to_string(), |(s, e)| format!("{s} .. {e}"));
        let min_obs = self
            .scaling_min_obs
            .map_or("method default".to_string(), |n| n.to_string());
        let anomaly = self
            .anomaly
            .map_or("none".to_string(), |a| a.to_string());

        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Validation Parameters")?;
            writeln!(f, "---------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            line!(
                "temporal_window = {}",
                self.temporal_window,
                "Half-width of the matching window"
            )?;
            line!(
                "max_distance_m  = {}",
                max_distance,
                "Largest nearest-neighbour distance"
            )?;
            line!("period          = {}", period, "Validation period")?;
            line!(
                "scaling_min_obs = {}",
                min_obs,
                "Minimum scaling overlap"
            )?;
            line!("anomaly         = {}", anomaly, "Anomaly pre-processing")?;
            Ok(())
        } else {
            write!(
                f,
                "ValidationParams(window={}, max_distance={}, period={}, scaling_min_obs={}, anomaly={})",
                self.temporal_window, max_distance, period, min_obs, anomaly
            )
        }
    }
}

/// An immutable, fully validated validation setup.
pub struct Validation {
    data_manager: DataManager,
    spatial_reference: String,
    temporal_reference: String,
    matcher: TemporalMatcher,
    masking: MaskingStage,
    scaler: Option<Scaler>,
    plan: CombinationPlan,
    calculators: Vec<(Binding, Arc<dyn MetricsCalculator>)>,
    params: ValidationParams,
}

impl Validation {
    pub fn builder() -> ValidationBuilder {
        ValidationBuilder::default()
    }

    pub fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    pub fn spatial_reference(&self) -> &str {
        &self.spatial_reference
    }

    pub fn temporal_reference(&self) -> &str {
        &self.temporal_reference
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.scaler.as_ref()
    }

    pub fn plan(&self) -> &CombinationPlan {
        &self.plan
    }

    pub fn params(&self) -> &ValidationParams {
        &self.params
    }

    pub(crate) fn calculator(&self, binding: Binding) -> Option<&dyn MetricsCalculator> {
        self.calculators
            .iter()
            .find(|(b, _)| *b == binding)
            .map(|(_, c)| c.as_ref())
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("datasets", &self.data_manager.datasets())
            .field("spatial_reference", &self.spatial_reference)
            .field("temporal_reference", &self.temporal_reference)
            .field("scaler", &self.scaler)
            .field("plan", &self.plan)
            .field("params", &self.params)
            .finish()
    }
}

/// Collects the pieces of a [`Validation`].
///
/// The spatial reference defaults to the first registered non-masking dataset, the
/// temporal reference to the spatial reference. Scaling is optional.
#[derive(Default)]
pub struct ValidationBuilder {
    datasets: Vec<DatasetConfig>,
    spatial_reference: Option<String>,
    temporal_reference: Option<String>,
    scaling: Option<ScalingConfig>,
    calculators: Vec<(Binding, Arc<dyn MetricsCalculator>)>,
    params: ValidationParams,
}

impl ValidationBuilder {
    pub fn dataset(mut self, config: DatasetConfig) -> Self {
        self.datasets.push(config);
        self
    }

    pub fn masking_dataset(mut self, config: DatasetConfig) -> Self {
        self.datasets.push(config.masking());
        self
    }

    pub fn spatial_reference(mut self, name: &str) -> Self {
        self.spatial_reference = Some(name.to_string());
        self
    }

    pub fn temporal_reference(mut self, name: &str) -> Self {
        self.temporal_reference = Some(name.to_string());
        self
    }

    pub fn scaling(mut self, config: ScalingConfig) -> Self {
        self.scaling = Some(config);
        self
    }

    pub fn metrics_calculator(
        mut self,
        binding: impl Into<Binding>,
        calculator: Arc<dyn MetricsCalculator>,
    ) -> Self {
        self.calculators.push((binding.into(), calculator));
        self
    }

    pub fn params(mut self, params: ValidationParams) -> Self {
        self.params = params;
        self
    }

    /// Validate the configuration and precompute the spatial and combination plans.
    ///
    /// Return
    /// ----------
    /// * The [`Validation`], or the first configuration error found (see the module
    ///   documentation for the list of checks).
    pub fn build(self) -> Result<Validation, GeovalError> {
        let ValidationBuilder {
            datasets,
            spatial_reference,
            temporal_reference,
            scaling,
            calculators,
            params,
        } = self;

        let params = ValidationParamsBuilder { params }.build()?;
        if calculators.is_empty() {
            return Err(GeovalError::InvalidParameter(
                "at least one metrics calculator must be registered".into(),
            ));
        }

        let spatial_reference = match spatial_reference {
            Some(name) => name,
            None => datasets
                .iter()
                .find(|d| !d.is_masking)
                .map(|d| d.name.clone())
                .ok_or_else(|| {
                    GeovalError::InvalidParameter("no dataset registered".into())
                })?,
        };
        let temporal_reference = temporal_reference.unwrap_or_else(|| spatial_reference.clone());
        check_reference(&datasets, "spatial", &spatial_reference)?;
        check_reference(&datasets, "temporal", &temporal_reference)?;

        let period = params
            .period
            .map(|(start, end)| (epoch_to_mjd(start), epoch_to_mjd(end)));
        let data_manager =
            DataManager::new(datasets, &spatial_reference, params.max_distance_m, period)?;

        let bindings: Vec<Binding> = calculators.iter().map(|(b, _)| *b).collect();
        let plan = CombinationPlan::new(data_manager.datasets(), &temporal_reference, &bindings)?;
        for (binding, calculator) in &calculators {
            if calculator.arity() != binding.k {
                return Err(GeovalError::ArityMismatch {
                    n: binding.n,
                    k: binding.k,
                    arity: calculator.arity(),
                });
            }
        }

        let scaler = scaling
            .map(|config| build_scaler(config, &data_manager, &plan, &params))
            .transpose()?;

        let matcher = TemporalMatcher::new(params.temporal_window);
        Ok(Validation {
            data_manager,
            spatial_reference,
            temporal_reference,
            matcher,
            masking: MaskingStage::new(matcher),
            scaler,
            plan,
            calculators,
            params,
        })
    }
}

fn check_reference(datasets: &[DatasetConfig], role: &str, name: &str) -> Result<(), GeovalError> {
    if datasets.iter().any(|d| d.name == name && !d.is_masking) {
        Ok(())
    } else {
        Err(GeovalError::UnknownReference {
            role: role.to_string(),
            name: name.to_string(),
        })
    }
}

fn build_scaler(
    config: ScalingConfig,
    data_manager: &DataManager,
    plan: &CombinationPlan,
    params: &ValidationParams,
) -> Result<Scaler, GeovalError> {
    let dataset = data_manager
        .dataset(&config.reference)
        .filter(|d| !d.is_masking)
        .ok_or_else(|| GeovalError::UnknownReference {
            role: "scaling".into(),
            name: config.reference.clone(),
        })?;

    let column = match &config.reference_column {
        Some(column) if dataset.columns.contains(column) => column.clone(),
        Some(column) => {
            return Err(GeovalError::UnknownColumns {
                dataset: dataset.name.clone(),
                columns: vec![column.clone()],
            })
        }
        None => dataset.columns[0].clone(),
    };

    if config.method == ScalingMethod::TripleCollocation {
        for group in plan.groups().iter().filter(|g| g.contains(&dataset.name)) {
            let columns: usize = group
                .names()
                .iter()
                .filter_map(|name| data_manager.dataset(name))
                .map(|d| d.columns.len())
                .sum();
            if columns != 3 {
                return Err(GeovalError::IncompatibleScaling {
                    method: config.method.to_string(),
                    reason: format!("group {group} has {columns} columns, exactly 3 are required"),
                });
            }
        }
    }

    if let Some(min_obs) = config.min_obs {
        if min_obs < MIN_OBS_LINEAR_SCALING {
            return Err(GeovalError::InvalidParameter(format!(
                "scaling min_obs must be >= {MIN_OBS_LINEAR_SCALING}"
            )));
        }
    }
    let min_obs = config
        .min_obs
        .or(params.scaling_min_obs)
        .unwrap_or_else(|| config.method.default_min_obs());

    Ok(Scaler::new(
        config.method,
        ColumnId::new(&dataset.name, &column),
        min_obs,
    ))
}

#[cfg(test)]
mod validation_test {
    use hifitime::Unit;

    use super::*;

    #[test]
    fn test_default_params() {
        let params = ValidationParams::default();
        assert_eq!(params.temporal_window, Unit::Hour * 1);
        assert_eq!(params.max_distance_m, None);
        assert_eq!(ValidationParams::builder().build().unwrap(), params);
    }

    #[test]
    fn test_params_validation() {
        let err = ValidationParams::builder()
            .temporal_window(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GeovalError::InvalidParameter("temporal_window must be > 0".into())
        );

        assert!(ValidationParams::builder()
            .max_distance_m(-1.0)
            .build()
            .is_err());
        assert!(ValidationParams::builder()
            .scaling_min_obs(1)
            .build()
            .is_err());

        let start = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let end = Epoch::from_gregorian_utc_at_midnight(2019, 1, 1);
        assert!(ValidationParams::builder().period(start, end).build().is_err());
        assert!(ValidationParams::builder().period(end, start).build().is_ok());

        assert_eq!(
            ValidationParams::builder()
                .anomaly(AnomalyMethod::Climatology { window_days: 0 })
                .build()
                .unwrap_err(),
            GeovalError::InvalidParameter("climatology window must be within 1..=366 days".into())
        );
    }

    #[test]
    fn test_params_display() {
        let params = ValidationParams::builder()
            .max_distance_m(25_000.0)
            .build()
            .unwrap();
        let table = format!("{params:#}");
        assert!(table.starts_with("Validation Parameters\n"));
        assert!(table.contains("max_distance_m  = 25000.0 m"));
        assert!(table.contains("scaling_min_obs = method default"));
        assert!(table.contains("anomaly         = none"));

        let short = format!("{params}");
        assert!(short.starts_with("ValidationParams(window="));
    }
}
