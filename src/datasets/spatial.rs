//! Spatial matching between the job location and every dataset grid.
//!
//! The spatial reference dataset is read at the job's own location identifier. Every
//! other dataset is resolved once per job, either through its [`SpatialIndex`] (nearest
//! grid point, optionally bounded by a maximum great-circle distance) or, when it has
//! no index, by handing the job coordinates straight to the reader.
//!
//! How each dataset is resolved is decided once, at setup, by [`SpatialMatcher::new`].
use std::collections::HashMap;

use ahash::RandomState;

use crate::constants::{Degree, Meter, EARTH_MEAN_RADIUS};
use crate::datasets::data_manager::UnavailableReason;
use crate::datasets::{DatasetConfig, Job, Location};
use crate::geoval_errors::GeovalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Read at the job's own location identifier.
    Identity,
    /// Nearest point of the dataset's spatial index.
    NearestIndex,
    /// Raw `(lon, lat)` handed to the reader.
    Coordinates,
}

#[derive(Debug, Clone)]
pub struct SpatialMatcher {
    resolutions: HashMap<String, Resolution, RandomState>,
    max_distance: Option<Meter>,
}

impl SpatialMatcher {
    /// Decide, for each registered dataset, how job locations are resolved.
    ///
    /// Arguments
    /// -----------------
    /// * `datasets` – every registration, masking datasets included.
    /// * `spatial_reference` – name of the dataset whose identifiers the jobs carry.
    /// * `max_distance` – optional bound (meters) on the nearest-neighbour distance.
    ///
    /// Return
    /// ----------
    /// * The matcher, or [`GeovalError::UnresolvableLocation`] for a non-reference
    ///   dataset that has neither a spatial index nor coordinate-based reads.
    pub fn new(
        datasets: &[DatasetConfig],
        spatial_reference: &str,
        max_distance: Option<Meter>,
    ) -> Result<Self, GeovalError> {
        let mut resolutions = HashMap::default();
        for ds in datasets {
            let resolution = if ds.name == spatial_reference {
                Resolution::Identity
            } else if ds.reader.spatial_index().is_some() {
                Resolution::NearestIndex
            } else if ds.reader.reads_coordinates() {
                Resolution::Coordinates
            } else {
                return Err(GeovalError::UnresolvableLocation(ds.name.clone()));
            };
            resolutions.insert(ds.name.clone(), resolution);
        }

        Ok(SpatialMatcher {
            resolutions,
            max_distance,
        })
    }

    pub fn resolution(&self, dataset: &str) -> Option<Resolution> {
        self.resolutions.get(dataset).copied()
    }

    /// Resolve the location at which `dataset` must be read for `job`.
    ///
    /// Return
    /// ----------
    /// * The [`Location`] to pass to the reader, or the reason the dataset has no
    ///   usable location for this job (empty index, neighbour too far).
    pub fn resolve(&self, dataset: &DatasetConfig, job: &Job) -> Result<Location, UnavailableReason> {
        match self.resolution(&dataset.name) {
            Some(Resolution::Identity) => Ok(Location::Id(job.gpi.clone())),
            Some(Resolution::Coordinates) => Ok(Location::Coordinates {
                lon: job.lon,
                lat: job.lat,
            }),
            Some(Resolution::NearestIndex) => {
                let index = dataset
                    .reader
                    .spatial_index()
                    .ok_or(UnavailableReason::NoNeighbour)?;
                let point = index
                    .nearest(job.lon, job.lat)
                    .ok_or(UnavailableReason::NoNeighbour)?;

                if let Some(max_distance) = self.max_distance {
                    let distance = haversine_distance(job.lon, job.lat, point.lon, point.lat);
                    if distance > max_distance {
                        return Err(UnavailableReason::TooFar {
                            distance,
                            max_distance,
                        });
                    }
                }
                Ok(Location::Id(point.id))
            }
            // Unregistered names never reach the data manager.
            None => Err(UnavailableReason::NoNeighbour),
        }
    }
}

/// Great-circle distance between two points on a spherical Earth (haversine formula).
///
/// Arguments
/// -----------------
/// * `lon1`, `lat1`, `lon2`, `lat2` – coordinates in degrees.
///
/// Return
/// ----------
/// * The distance in meters, using [`EARTH_MEAN_RADIUS`].
pub fn haversine_distance(lon1: Degree, lat1: Degree, lon2: Degree, lat2: Degree) -> Meter {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS * a.sqrt().min(1.0).asin()
}
