//! Timestamp-indexed tables.
//!
//! A [`TimeSeries`] is the unit of data exchanged between dataset readers and the
//! validation engine: a strictly time-sorted index of epochs (MJD, UTC) and a set of
//! named `f64` columns of the same length. Missing values are `NaN`.
//!
//! Masking datasets use the same representation with a single column holding `0.0`
//! (`false`) or `1.0` (`true`); see [`TimeSeries::from_flags`].
use ordered_float::OrderedFloat;

use crate::constants::MJD;
use crate::geoval_errors::GeovalError;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    times: Vec<MJD>,
    columns: Vec<(String, Vec<f64>)>,
}

impl TimeSeries {
    /// Build a time series from MJD timestamps and named columns.
    ///
    /// Rows are sorted by time. Every instant must be unique.
    ///
    /// Arguments
    /// -----------------
    /// * `times` – observation instants as MJD (UTC). `NaN` instants are rejected.
    /// * `columns` – `(name, values)` pairs, each with `times.len()` values.
    ///
    /// Return
    /// ----------
    /// * The sorted [`TimeSeries`], or [`GeovalError::InvalidTimeSeries`] on length
    ///   mismatch, duplicated column names, non-finite or repeated timestamps.
    pub fn new(times: Vec<MJD>, columns: Vec<(String, Vec<f64>)>) -> Result<Self, GeovalError> {
        if times.iter().any(|t| !t.is_finite()) {
            return Err(GeovalError::InvalidTimeSeries(
                "timestamps must be finite".into(),
            ));
        }
        for (idx, (name, values)) in columns.iter().enumerate() {
            if values.len() != times.len() {
                return Err(GeovalError::InvalidTimeSeries(format!(
                    "column {name} has {} values for {} timestamps",
                    values.len(),
                    times.len()
                )));
            }
            if columns[..idx].iter().any(|(other, _)| other == name) {
                return Err(GeovalError::InvalidTimeSeries(format!(
                    "column {name} appears twice"
                )));
            }
        }

        let sorted = times.windows(2).all(|w| w[0] <= w[1]);
        let (times, columns) = if sorted {
            (times, columns)
        } else {
            let mut order: Vec<usize> = (0..times.len()).collect();
            order.sort_by_key(|&i| OrderedFloat(times[i]));

            let sorted_times: Vec<MJD> = order.iter().map(|&i| times[i]).collect();
            let columns = columns
                .into_iter()
                .map(|(name, values)| (name, order.iter().map(|&i| values[i]).collect()))
                .collect();
            (sorted_times, columns)
        };

        if let Some(w) = times
            .windows(2)
            .find(|w| OrderedFloat(w[0]) == OrderedFloat(w[1]))
        {
            return Err(GeovalError::InvalidTimeSeries(format!(
                "timestamp {} appears twice",
                w[0]
            )));
        }
        Ok(TimeSeries { times, columns })
    }

    /// Build a single-column boolean series, as returned by masking readers.
    pub fn from_flags(times: Vec<MJD>, name: &str, flags: &[bool]) -> Result<Self, GeovalError> {
        let values = flags.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect();
        Self::new(times, vec![(name.to_string(), values)])
    }

    /// An empty table carrying the given column names.
    pub fn empty(names: &[String]) -> Self {
        TimeSeries {
            times: Vec::new(),
            columns: names.iter().map(|n| (n.clone(), Vec::new())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[MJD] {
        &self.times
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    /// Restrict the table to `names`, in that order.
    ///
    /// Return
    /// ----------
    /// * `Ok(TimeSeries)` with exactly the requested columns, or `Err(missing)` listing
    ///   the requested names the table does not hold.
    pub fn select(&self, names: &[String]) -> Result<TimeSeries, Vec<String>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.column(n).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let columns = names
            .iter()
            .filter_map(|n| self.column(n).map(|v| (n.clone(), v.to_vec())))
            .collect();
        Ok(TimeSeries {
            times: self.times.clone(),
            columns,
        })
    }

    /// Keep the rows whose flag is `true`.
    pub fn filter_rows(&self, keep: &[bool]) -> TimeSeries {
        debug_assert_eq!(keep.len(), self.len());
        let pick = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(keep)
                .filter_map(|(v, &k)| k.then_some(*v))
                .collect()
        };

        TimeSeries {
            times: pick(&self.times),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), pick(v)))
                .collect(),
        }
    }

    /// Keep the rows observed within `[start, end]` (inclusive, MJD).
    pub fn restrict_to_period(&self, start: MJD, end: MJD) -> TimeSeries {
        let keep: Vec<bool> = self.times.iter().map(|t| *t >= start && *t <= end).collect();
        self.filter_rows(&keep)
    }

    /// Whether row `row` holds at least one non-missing value.
    pub(crate) fn row_has_data(&self, row: usize) -> bool {
        self.columns.iter().any(|(_, v)| !v[row].is_nan())
    }
}
