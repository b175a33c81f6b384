//! # Anomaly pre-processing
//!
//! Optional stage between **SCALE** and **COMPUTE**: every column of a scaled combined
//! table is replaced by its anomaly, so calculators compare short-term variations
//! instead of absolute values (seasonal cycles removed).
//!
//! Two methods are available:
//!
//! * [`AnomalyMethod::MovingAverage`] – subtract a centered moving average:
//!
//! ```text
//! a(t) = x(t) − mean{ x(s) : |s − t| ≤ window / 2 }
//! ```
//!
//! * [`AnomalyMethod::Climatology`] – subtract a day-of-year climatology. The
//!   climatology is the mean of all values observed on each day of year, smoothed with
//!   a circular moving average of `window_days` days.
//!
//! Days of year run from 1 to 366 on a leap-year calendar: in common years every day
//! from March 1st on is shifted by one, so a calendar date always maps to the same
//! day of year.
//!
//! Missing values (`NaN`) stay missing and never enter a mean. Anomalies are computed
//! over the matched timestamps of the table, i.e. after temporal matching.
use std::fmt;

use hifitime::Duration;

use crate::constants::MJD;
use crate::geoval_errors::GeovalError;
use crate::matching::{ColumnId, CombinedTable};
use crate::time::{duration_to_days, mjd_to_epoch};

/// Number of days of year on the leap-year calendar.
pub const DAYS_IN_CLIMATOLOGY: usize = 366;

/// First day of year of each month on a leap-year calendar, minus one.
const LEAP_YEAR_MONTH_OFFSETS: [usize; 12] =
    [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyMethod {
    /// Centered moving average of total width `window`.
    MovingAverage { window: Duration },
    /// Day-of-year climatology smoothed over `window_days` days.
    Climatology { window_days: usize },
}

impl fmt::Display for AnomalyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyMethod::MovingAverage { window } => write!(f, "moving_average({window})"),
            AnomalyMethod::Climatology { window_days } => {
                write!(f, "climatology({window_days} days)")
            }
        }
    }
}

impl AnomalyMethod {
    pub fn validate(&self) -> Result<(), GeovalError> {
        match self {
            AnomalyMethod::MovingAverage { window } if *window <= Duration::ZERO => Err(
                GeovalError::InvalidParameter("anomaly window must be > 0".into()),
            ),
            AnomalyMethod::Climatology { window_days }
                if *window_days == 0 || *window_days > DAYS_IN_CLIMATOLOGY =>
            {
                Err(GeovalError::InvalidParameter(format!(
                    "climatology window must be within 1..={DAYS_IN_CLIMATOLOGY} days"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Anomalies of `values` observed at `times` (sorted MJD).
    pub fn apply(&self, times: &[MJD], values: &[f64]) -> Vec<f64> {
        match self {
            AnomalyMethod::MovingAverage { window } => {
                moving_average_anomaly(times, values, duration_to_days(*window))
            }
            AnomalyMethod::Climatology { window_days } => {
                climatology_anomaly(times, values, *window_days)
            }
        }
    }

    /// Replace every column of `table` by its anomaly.
    pub fn apply_table(&self, mut table: CombinedTable) -> CombinedTable {
        let ids: Vec<ColumnId> = table.column_ids().cloned().collect();
        for id in ids {
            let anomalies = table
                .column(&id)
                .map(|values| self.apply(table.times(), values));
            if let Some(anomalies) = anomalies {
                table.replace_column(&id, anomalies);
            }
        }
        table
    }
}

/// Subtract from each value the mean of the values within `±window_days / 2`.
pub fn moving_average_anomaly(times: &[MJD], values: &[f64], window_days: f64) -> Vec<f64> {
    let half = window_days / 2.0;

    // Prefix sums over non-missing values.
    let mut sums = Vec::with_capacity(values.len() + 1);
    let mut counts = Vec::with_capacity(values.len() + 1);
    sums.push(0.0);
    counts.push(0usize);
    for v in values {
        let (s, c) = (sums[sums.len() - 1], counts[counts.len() - 1]);
        if v.is_nan() {
            sums.push(s);
            counts.push(c);
        } else {
            sums.push(s + v);
            counts.push(c + 1);
        }
    }

    times
        .iter()
        .zip(values)
        .map(|(&t, &v)| {
            if v.is_nan() {
                return f64::NAN;
            }
            let lo = times.partition_point(|s| *s < t - half);
            let hi = times.partition_point(|s| *s <= t + half);
            let n = counts[hi] - counts[lo];
            v - (sums[hi] - sums[lo]) / n as f64
        })
        .collect()
}

/// Day of year (1..=366) of `t` on the leap-year calendar.
pub fn day_of_year(t: MJD) -> usize {
    let (_, month, day, _, _, _, _) = mjd_to_epoch(t.floor()).to_gregorian_utc();
    LEAP_YEAR_MONTH_OFFSETS[usize::from(month.clamp(1, 12)) - 1] + usize::from(day)
}

/// Smoothed day-of-year climatology, indexed by `day_of_year - 1`.
///
/// Return
/// ----------
/// * [`DAYS_IN_CLIMATOLOGY`] values; `NaN` for a day with no data within its
///   smoothing window.
pub fn climatology(times: &[MJD], values: &[f64], window_days: usize) -> Vec<f64> {
    let mut sums = vec![0.0; DAYS_IN_CLIMATOLOGY];
    let mut counts = vec![0usize; DAYS_IN_CLIMATOLOGY];
    for (&t, &v) in times.iter().zip(values) {
        if !v.is_nan() {
            let d = day_of_year(t) - 1;
            sums[d] += v;
            counts[d] += 1;
        }
    }
    let daily: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect();

    let half = (window_days / 2) as isize;
    let n = DAYS_IN_CLIMATOLOGY as isize;
    (0..n)
        .map(|d| {
            let (sum, count) = (-half..=half)
                .map(|j| daily[(d + j).rem_euclid(n) as usize])
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Subtract the smoothed day-of-year climatology of the series from each value.
pub fn climatology_anomaly(times: &[MJD], values: &[f64], window_days: usize) -> Vec<f64> {
    let clim = climatology(times, values, window_days);
    times
        .iter()
        .zip(values)
        .map(|(&t, &v)| v - clim[day_of_year(t) - 1])
        .collect()
}
