//! Reading every registered dataset for one job.
//!
//! The [`DataManager`] owns the immutable dataset registrations and the
//! [`SpatialMatcher`]. For a job it resolves each dataset's location, reads it with its
//! registered options, trims it to the validation period and restricts it to the
//! registered columns. Failures never escape: a dataset that cannot be read becomes a
//! [`ReadingResult::Unavailable`] carrying the reason.
use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use hifitime::Duration;
use tracing::{debug, warn};

use crate::constants::{Meter, MJD};
use crate::datasets::spatial::SpatialMatcher;
use crate::datasets::{DatasetConfig, Job, ReadError, TimeSeries};
use crate::geoval_errors::GeovalError;

/// Why a dataset contributes no data to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    ReadFailed(String),
    Timeout(Duration),
    Empty,
    MissingColumns(Vec<String>),
    NoNeighbour,
    TooFar { distance: Meter, max_distance: Meter },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::ReadFailed(msg) => write!(f, "read failed: {msg}"),
            UnavailableReason::Timeout(d) => write!(f, "read timed out after {d}"),
            UnavailableReason::Empty => write!(f, "no observations"),
            UnavailableReason::MissingColumns(cols) => {
                write!(f, "reader returned no {}", cols.join(", "))
            }
            UnavailableReason::NoNeighbour => write!(f, "no grid point near the job location"),
            UnavailableReason::TooFar {
                distance,
                max_distance,
            } => write!(
                f,
                "nearest grid point is {distance:.0} m away (max {max_distance:.0} m)"
            ),
        }
    }
}

impl From<ReadError> for UnavailableReason {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Timeout(d) => UnavailableReason::Timeout(d),
            ReadError::NoData => UnavailableReason::Empty,
            ReadError::Failed(msg) => UnavailableReason::ReadFailed(msg),
        }
    }
}

/// Outcome of reading one dataset for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingResult {
    Available(TimeSeries),
    Unavailable(UnavailableReason),
}

impl ReadingResult {
    pub fn table(&self) -> Option<&TimeSeries> {
        match self {
            ReadingResult::Available(ts) => Some(ts),
            ReadingResult::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ReadingResult::Available(_))
    }

    /// The failure as a [`GeovalError::DatasetUnavailable`], if any.
    pub fn to_error(&self, dataset: &str) -> Option<GeovalError> {
        match self {
            ReadingResult::Available(_) => None,
            ReadingResult::Unavailable(reason) => Some(GeovalError::DatasetUnavailable {
                dataset: dataset.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Reading results of one job, keyed by dataset name.
pub type Readings = HashMap<String, ReadingResult, RandomState>;

pub struct DataManager {
    datasets: Vec<DatasetConfig>,
    spatial: SpatialMatcher,
    period: Option<(MJD, MJD)>,
}

impl DataManager {
    /// Validate the registrations and build the spatial resolution plan.
    ///
    /// Arguments
    /// -----------------
    /// * `datasets` – registrations in registration order, masking datasets included.
    /// * `spatial_reference` – dataset whose identifiers the jobs carry.
    /// * `max_distance` – optional bound on nearest-neighbour distances (meters).
    /// * `period` – optional `[start, end]` (MJD) every reading is trimmed to.
    ///
    /// Return
    /// ----------
    /// * The [`DataManager`], or a configuration error:
    ///   [`GeovalError::DuplicateDataset`], [`GeovalError::EmptyColumns`],
    ///   [`GeovalError::UnknownColumns`], [`GeovalError::InvalidMaskingDataset`] or
    ///   [`GeovalError::UnresolvableLocation`].
    pub fn new(
        datasets: Vec<DatasetConfig>,
        spatial_reference: &str,
        max_distance: Option<Meter>,
        period: Option<(MJD, MJD)>,
    ) -> Result<Self, GeovalError> {
        for (idx, ds) in datasets.iter().enumerate() {
            if datasets[..idx].iter().any(|other| other.name == ds.name) {
                return Err(GeovalError::DuplicateDataset(ds.name.clone()));
            }
            validate_registration(ds)?;
        }

        let spatial = SpatialMatcher::new(&datasets, spatial_reference, max_distance)?;
        Ok(DataManager {
            datasets,
            spatial,
            period,
        })
    }

    pub fn datasets(&self) -> &[DatasetConfig] {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|ds| ds.name == name)
    }

    pub fn spatial_matcher(&self) -> &SpatialMatcher {
        &self.spatial
    }

    /// Read every registered dataset for `job`.
    pub fn read_all(&self, job: &Job) -> Readings {
        self.datasets
            .iter()
            .map(|ds| (ds.name.clone(), self.read_dataset(ds, job)))
            .collect()
    }

    /// Read one dataset for `job`, turning every failure into an unavailable marker.
    pub fn read_dataset(&self, ds: &DatasetConfig, job: &Job) -> ReadingResult {
        let result = match self.try_read(ds, job) {
            Ok(ts) => {
                debug!(dataset = %ds.name, gpi = %job.gpi, rows = ts.len(), "dataset read");
                ReadingResult::Available(ts)
            }
            Err(reason) => ReadingResult::Unavailable(reason),
        };
        if let Some(err) = result.to_error(&ds.name) {
            warn!(gpi = %job.gpi, "{err}");
        }
        result
    }

    fn try_read(&self, ds: &DatasetConfig, job: &Job) -> Result<TimeSeries, UnavailableReason> {
        let location = self.spatial.resolve(ds, job)?;
        let raw = ds.reader.read(&location, &ds.read_options)?;

        let mut table = raw
            .select(&ds.columns)
            .map_err(UnavailableReason::MissingColumns)?;
        if let Some((start, end)) = self.period {
            table = table.restrict_to_period(start, end);
        }

        if table.is_empty() {
            return Err(UnavailableReason::Empty);
        }
        Ok(table)
    }
}

fn validate_registration(ds: &DatasetConfig) -> Result<(), GeovalError> {
    if ds.columns.is_empty() {
        return Err(GeovalError::EmptyColumns(ds.name.clone()));
    }

    let available = ds.reader.available_columns();
    let unknown: Vec<String> = ds
        .columns
        .iter()
        .filter(|c| !available.contains(c))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(GeovalError::UnknownColumns {
            dataset: ds.name.clone(),
            columns: unknown,
        });
    }

    if ds.is_masking && ds.columns.len() != 1 {
        return Err(GeovalError::InvalidMaskingDataset {
            dataset: ds.name.clone(),
            reason: format!(
                "expected exactly one boolean column, got {}",
                ds.columns.len()
            ),
        });
    }
    Ok(())
}
