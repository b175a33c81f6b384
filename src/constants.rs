//! # Constants and type definitions for geoval
//!
//! This module centralizes the **physical constants**, **default thresholds**, and
//! **common type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Geodetic constants used by the spatial matcher
//! - Time unit conversions
//! - Default minimum sample counts for the scaling methods
//! - Core type aliases (angles, distances, epochs)

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Number of seconds in a day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Mean Earth radius in meters (IUGG), used for great-circle distances
pub const EARTH_MEAN_RADIUS: f64 = 6_371_008.8;

/// Default half-width of the temporal matching window, in hours
pub const DEFAULT_TEMPORAL_WINDOW_HOURS: i64 = 1;

// -------------------------------------------------------------------------------------------------
// Minimum overlapping samples per scaling method
// -------------------------------------------------------------------------------------------------

/// Linear methods (min/max, mean/std, linear regression) need two points to fit.
pub const MIN_OBS_LINEAR_SCALING: usize = 2;

/// Percentile-based CDF matching needs enough samples for stable percentiles.
pub const MIN_OBS_CDF_SCALING: usize = 10;

/// Triple collocation relies on covariances of three series.
pub const MIN_OBS_TCOL_SCALING: usize = 10;

/// Percentiles used by the piecewise-linear CDF matching.
pub const CDF_PERCENTILES: [f64; 9] = [0.0, 5.0, 10.0, 30.0, 50.0, 70.0, 90.0, 95.0, 100.0];

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Distance in meters
pub type Meter = f64;
/// Modified Julian Date (days, UTC)
pub type MJD = f64;

/// Name of a registered dataset
pub type DatasetName = String;

/// Name given to the reference column handed to metric calculators.
pub const REFERENCE_COLUMN_NAME: &str = "ref";

/// Relative tolerance under which a spread or covariance is treated as zero
pub const EPS: f64 = 1e-12;
