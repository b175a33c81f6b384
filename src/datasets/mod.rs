//! # Dataset adapter contract
//!
//! This module defines how the validation engine talks to heterogeneous data sources:
//!
//! 1. **Jobs** ([`Job`]) – one validation unit: a location identifier of the spatial
//!    reference dataset plus its longitude/latitude.
//! 2. **Locations** ([`Location`]) – what a reader receives: either a dataset-local
//!    identifier or raw coordinates.
//! 3. **Readers** ([`DatasetReader`]) – the capability wrapping a satellite or in-situ
//!    product. A reader declares the columns it can return, reads a [`TimeSeries`] for a
//!    location, and optionally exposes a [`SpatialIndex`] over its own sampling grid or
//!    accepts coordinate-based reads.
//! 4. **Registrations** ([`DatasetConfig`]) – a named reader, the columns to keep,
//!    immutable read options, and whether the dataset is a masking dataset.
//!
//! ## Reader variants
//!
//! | Reader kind            | `spatial_index()` | `reads_coordinates()` | Resolved location       |
//! |------------------------|-------------------|-----------------------|-------------------------|
//! | Gridded, indexed       | `Some(_)`         | any                   | `Location::Id(nearest)` |
//! | Coordinate-resolving   | `None`            | `true`                | `Location::Coordinates` |
//! | Station list, no index | `None`            | `false`               | setup error             |
//!
//! The spatial reference dataset always receives `Location::Id(job.gpi)`.
//!
//! ## See also
//! ------------
//! * [`spatial::SpatialMatcher`] – per-dataset location resolution.
//! * [`data_manager::DataManager`] – reads every registered dataset for a job.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hifitime::Duration;
use thiserror::Error;

use crate::constants::{DatasetName, Degree};

pub mod data_manager;
pub mod spatial;
pub mod time_series;

pub use time_series::TimeSeries;

/// Identifier of a location inside one dataset.
///
/// This can be:
/// - A grid point index (e.g. `Index(1_234_567)`)
/// - An opaque station identifier (e.g. `"SCAN_2001"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationId {
    Index(u64),
    Name(String),
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationId::Index(n) => write!(f, "{n}"),
            LocationId::Name(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for LocationId {
    fn from(n: u64) -> Self {
        LocationId::Index(n)
    }
}

impl From<&str> for LocationId {
    fn from(s: &str) -> Self {
        LocationId::Name(s.to_string())
    }
}

impl From<String> for LocationId {
    fn from(s: String) -> Self {
        LocationId::Name(s)
    }
}

/// One validation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub gpi: LocationId,
    pub lon: Degree,
    pub lat: Degree,
}

impl Job {
    pub fn new(gpi: impl Into<LocationId>, lon: Degree, lat: Degree) -> Self {
        Job {
            gpi: gpi.into(),
            lon,
            lat,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} ({:.4}, {:.4})", self.gpi, self.lon, self.lat)
    }
}

/// Location handed to [`DatasetReader::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Id(LocationId),
    Coordinates { lon: Degree, lat: Degree },
}

/// A sampling location of a dataset grid, as returned by a [`SpatialIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub id: LocationId,
    pub lon: Degree,
    pub lat: Degree,
}

/// Nearest-neighbour lookup into a dataset's own sampling locations.
pub trait SpatialIndex: Send + Sync {
    /// The sampling location closest to `(lon, lat)`, or `None` if the grid is empty.
    fn nearest(&self, lon: Degree, lat: Degree) -> Option<GridPoint>;
}

/// Failure reported by a reader for one location.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("read timed out after {0}")]
    Timeout(Duration),

    #[error("no data at this location")]
    NoData,

    #[error("{0}")]
    Failed(String),
}

/// Immutable per-dataset read options, passed untouched to every read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions(BTreeMap<String, String>);

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read capability over one heterogeneous data source.
///
/// Readers are shared read-only across concurrently processed jobs, hence the
/// `Send + Sync` bound. A reader that keeps file handles must either guard them or
/// reopen them per call.
pub trait DatasetReader: Send + Sync {
    /// Every column this reader can return.
    fn available_columns(&self) -> Vec<String>;

    /// Read the time series at `location`.
    fn read(&self, location: &Location, options: &ReadOptions) -> Result<TimeSeries, ReadError>;

    /// Nearest-neighbour index over the reader's sampling grid, if any.
    fn spatial_index(&self) -> Option<&dyn SpatialIndex> {
        None
    }

    /// Whether [`read`](DatasetReader::read) accepts [`Location::Coordinates`].
    fn reads_coordinates(&self) -> bool {
        false
    }
}

/// Registration of one dataset in a validation run.
#[derive(Clone)]
pub struct DatasetConfig {
    pub name: DatasetName,
    pub reader: Arc<dyn DatasetReader>,
    pub columns: Vec<String>,
    pub read_options: ReadOptions,
    pub is_masking: bool,
}

impl DatasetConfig {
    pub fn new(name: &str, reader: Arc<dyn DatasetReader>, columns: &[&str]) -> Self {
        DatasetConfig {
            name: name.to_string(),
            reader,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            read_options: ReadOptions::default(),
            is_masking: false,
        }
    }

    pub fn with_read_options(mut self, options: ReadOptions) -> Self {
        self.read_options = options;
        self
    }

    /// Mark this dataset as a masking dataset (one boolean column).
    pub fn masking(mut self) -> Self {
        self.is_masking = true;
        self
    }
}

impl fmt::Debug for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetConfig")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("read_options", &self.read_options)
            .field("is_masking", &self.is_masking)
            .finish_non_exhaustive()
    }
}
