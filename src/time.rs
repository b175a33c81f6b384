use hifitime::{Duration, Epoch, Unit};

use crate::constants::{DEFAULT_TEMPORAL_WINDOW_HOURS, MJD, SECONDS_PER_DAY};

/// Transformation from an epoch to a modified julian date (MJD) in the UTC scale
pub fn epoch_to_mjd(epoch: Epoch) -> MJD {
    epoch.to_mjd_utc_days()
}

/// Transformation from a modified julian date (MJD, UTC) to an epoch
pub fn mjd_to_epoch(mjd: MJD) -> Epoch {
    Epoch::from_mjd_utc(mjd)
}

/// Length of a duration expressed in days.
pub fn duration_to_days(duration: Duration) -> f64 {
    duration.to_seconds() / SECONDS_PER_DAY
}

/// Default half-width of the temporal matching window.
pub fn default_temporal_window() -> Duration {
    Unit::Hour * DEFAULT_TEMPORAL_WINDOW_HOURS
}
