//! # Metric calculators and result records
//!
//! The engine does not implement statistics itself: metrics come from user-provided
//! [`MetricsCalculator`]s bound to an `(n, k)` pair. This module defines the calculator
//! capability, the harmonized input handed to it, and the per-combination
//! [`MetricRecord`] assembled from its output.
//!
//! ## Calculator input
//!
//! A [`MetricInput`] holds the complete rows (every column present) of one combination
//! key, after temporal matching and scaling. Its columns are renamed
//! `["ref", "k1", "k2", ...]` in key order, so calculators are independent of dataset
//! names. The original [`ColumnId`]s stay available through
//! [`MetricInput::column_ids`].
//!
//! ## Dispatch
//!
//! [`dispatch`] never lets a calculator run on too little data:
//!
//! | condition                                      | record status                       |
//! |------------------------------------------------|-------------------------------------|
//! | a key column could not be scaled               | `InsufficientData`                  |
//! | `n_obs` is 0 or below the calculator `min_obs` | `InsufficientData`                  |
//! | the calculator returns an error                | `CalculatorError(message)`          |
//! | otherwise                                      | `Computed`, with calculator values  |
//!
//! Every record carries `gpi`, `lon`, `lat` and `n_obs`.
use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::constants::{Degree, MJD, REFERENCE_COLUMN_NAME};
use crate::datasets::{Job, LocationId};
use crate::geoval_errors::GeovalError;
use crate::matching::ColumnId;

/// A single metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Series(Vec<f64>),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Series(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", joined.join(" "))
            }
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(v as i64)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(v: Vec<f64>) -> Self {
        MetricValue::Series(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<&LocationId> for MetricValue {
    fn from(id: &LocationId) -> Self {
        match id {
            LocationId::Index(n) => MetricValue::Int(*n as i64),
            LocationId::Name(s) => MetricValue::Text(s.clone()),
        }
    }
}

/// Metric name to value.
pub type MetricMap = BTreeMap<String, MetricValue>;

/// Harmonized complete rows of one combination key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInput {
    times: Vec<MJD>,
    ids: Vec<ColumnId>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl MetricInput {
    /// Build the input from the selected columns, named `ref`, `k1`, `k2`, ...
    ///
    /// `columns` must have one entry per id, each as long as `times`.
    pub fn new(times: Vec<MJD>, ids: Vec<ColumnId>, columns: Vec<Vec<f64>>) -> Self {
        let names = (0..ids.len())
            .map(|i| {
                if i == 0 {
                    REFERENCE_COLUMN_NAME.to_string()
                } else {
                    format!("k{i}")
                }
            })
            .collect();
        MetricInput {
            times,
            ids,
            names,
            columns,
        }
    }

    pub fn n_obs(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[MJD] {
        &self.times
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column_ids(&self) -> &[ColumnId] {
        &self.ids
    }

    /// The reference column (`ref`).
    pub fn reference(&self) -> &[f64] {
        &self.columns[0]
    }

    /// Column by its calculator-facing name (`ref`, `k1`, ...).
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// The non-reference columns with their names.
    pub fn others(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .zip(&self.columns)
            .skip(1)
            .map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// A metric calculator bound to one `(n, k)` pair.
///
/// Calculators are shared between concurrently processed jobs and must be
/// `Send + Sync`.
pub trait MetricsCalculator: Send + Sync {
    /// Number of columns the calculator expects (`k`).
    fn arity(&self) -> usize;

    /// Minimum number of complete rows; below it the calculator is not called.
    fn min_obs(&self) -> usize {
        1
    }

    /// Compute the metrics of one combination at one job.
    fn calc(&self, input: &MetricInput, job: &Job) -> Result<MetricMap, GeovalError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordStatus {
    Computed,
    InsufficientData { required: usize },
    CalculatorError(String),
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Computed => f.write_str("computed"),
            RecordStatus::InsufficientData { required } => {
                write!(f, "insufficient_data (min {required})")
            }
            RecordStatus::CalculatorError(msg) => write!(f, "calculator_error: {msg}"),
        }
    }
}

/// Metrics of one combination key at one job.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub gpi: LocationId,
    pub lon: Degree,
    pub lat: Degree,
    pub n_obs: usize,
    pub status: RecordStatus,
    pub values: MetricMap,
}

impl MetricRecord {
    fn for_job(job: &Job, n_obs: usize, status: RecordStatus, values: MetricMap) -> Self {
        MetricRecord {
            gpi: job.gpi.clone(),
            lon: job.lon,
            lat: job.lat,
            n_obs,
            status,
            values,
        }
    }

    pub fn computed(job: &Job, n_obs: usize, values: MetricMap) -> Self {
        Self::for_job(job, n_obs, RecordStatus::Computed, values)
    }

    pub fn insufficient(job: &Job, n_obs: usize, required: usize) -> Self {
        Self::for_job(
            job,
            n_obs,
            RecordStatus::InsufficientData { required },
            MetricMap::new(),
        )
    }

    pub fn calculator_error(job: &Job, n_obs: usize, message: String) -> Self {
        Self::for_job(
            job,
            n_obs,
            RecordStatus::CalculatorError(message),
            MetricMap::new(),
        )
    }

    pub fn is_computed(&self) -> bool {
        self.status == RecordStatus::Computed
    }

    pub fn get(&self, metric: &str) -> Option<&MetricValue> {
        self.values.get(metric)
    }

    /// The calculator values merged with the job metadata (`gpi`, `lon`, `lat`, `n_obs`).
    pub fn to_metric_map(&self) -> MetricMap {
        let mut map = self.values.clone();
        map.insert("gpi".into(), (&self.gpi).into());
        map.insert("lon".into(), self.lon.into());
        map.insert("lat".into(), self.lat.into());
        map.insert("n_obs".into(), self.n_obs.into());
        map
    }
}

/// Run `calculator` on `input`, turning every failure into a record status.
///
/// Arguments
/// -----------------
/// * `calculator` – the calculator bound to the key's `(n, k)`.
/// * `input` – complete rows of the key.
/// * `job` – the job being processed; its metadata is merged into the record.
/// * `scaling_failed` – whether a column of the key could not be scaled.
///
/// Return
/// ----------
/// * The [`MetricRecord`] for the key.
pub fn dispatch(
    calculator: &dyn MetricsCalculator,
    input: &MetricInput,
    job: &Job,
    scaling_failed: bool,
) -> MetricRecord {
    let n_obs = input.n_obs();
    let required = calculator.min_obs().max(1);

    if scaling_failed || n_obs < required {
        return MetricRecord::insufficient(job, n_obs, required);
    }

    match calculator.calc(input, job) {
        Ok(values) => MetricRecord::computed(job, n_obs, values),
        Err(err) => {
            warn!(gpi = %job.gpi, columns = ?input.column_ids(), %err, "metrics calculator failed");
            MetricRecord::calculator_error(job, n_obs, err.to_string())
        }
    }
}

#[cfg(test)]
mod metrics_test {
    use approx::assert_relative_eq;

    use super::*;

    struct MeanDiff;

    impl MetricsCalculator for MeanDiff {
        fn arity(&self) -> usize {
            2
        }

        fn min_obs(&self) -> usize {
            3
        }

        fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
            let k1 = input
                .column("k1")
                .ok_or_else(|| GeovalError::Calculator("no k1 column".into()))?;
            if k1.iter().any(|v| *v < 0.0) {
                return Err(GeovalError::Calculator("negative value".into()));
            }
            let diff: f64 = input.reference().iter().zip(k1).map(|(r, k)| k - r).sum();
            let mut out = MetricMap::new();
            out.insert("bias".into(), (diff / input.n_obs() as f64).into());
            Ok(out)
        }
    }

    fn input(k1: Vec<f64>) -> MetricInput {
        let n = k1.len();
        MetricInput::new(
            (0..n).map(|i| i as f64).collect(),
            vec![ColumnId::new("a", "sm"), ColumnId::new("b", "sm")],
            vec![vec![1.0; n], k1],
        )
    }

    #[test]
    fn test_input_names() {
        let input = input(vec![2.0, 3.0]);
        assert_eq!(input.names(), &["ref", "k1"]);
        assert_eq!(input.others().map(|(n, _)| n).collect::<Vec<_>>(), vec!["k1"]);
        assert_eq!(input.column("k2"), None);
        assert_eq!(input.arity(), 2);
    }

    #[test]
    fn test_dispatch_statuses() {
        let job = Job::new(7_u64, 16.3, 48.2);

        let record = dispatch(&MeanDiff, &input(vec![2.0, 3.0, 4.0]), &job, false);
        assert!(record.is_computed());
        assert_relative_eq!(record.get("bias").unwrap().as_f64().unwrap(), 2.0);
        assert_eq!(record.n_obs, 3);

        let record = dispatch(&MeanDiff, &input(vec![2.0, 3.0]), &job, false);
        assert_eq!(record.status, RecordStatus::InsufficientData { required: 3 });
        assert!(record.values.is_empty());

        let record = dispatch(&MeanDiff, &input(vec![2.0, 3.0, 4.0]), &job, true);
        assert_eq!(record.status, RecordStatus::InsufficientData { required: 3 });

        let record = dispatch(&MeanDiff, &input(vec![2.0, -3.0, 4.0]), &job, false);
        assert_eq!(
            record.status,
            RecordStatus::CalculatorError("Metrics calculator failed: negative value".into())
        );
    }

    #[test]
    fn test_record_metadata() {
        let job = Job::new("SCAN_2001", 16.3, 48.2);
        let record = MetricRecord::insufficient(&job, 0, 1);
        let map = record.to_metric_map();
        assert_eq!(map["gpi"], MetricValue::Text("SCAN_2001".into()));
        assert_eq!(map["lon"], MetricValue::Float(16.3));
        assert_eq!(map["lat"], MetricValue::Float(48.2));
        assert_eq!(map["n_obs"], MetricValue::Int(0));
    }
}
