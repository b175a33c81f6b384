//! # Temporal matching
//!
//! Aligns the observations of several datasets to the timestamps of a **temporal
//! reference** dataset.
//!
//! ## Matching rule
//!
//! Each observation of a non-reference table is attached to its **nearest reference
//! timestamp** if the two are at most `window` apart:
//!
//! ```text
//! |t_ref - t_other| ≤ window
//! ```
//!
//! - Two equally distant reference timestamps: the earlier one wins.
//! - Several observations of the same table competing for one reference timestamp:
//!   the nearest wins, ties go to the earliest observation.
//! - Observations whose values are all missing are ignored.
//!
//! A reference row left without a partner keeps `NaN` in that dataset's columns. The
//! combined table only keeps reference rows with at least one non-reference
//! contribution (all rows when there is no other table).
//!
//! ## Complexity
//!
//! Reference timestamps are sorted by construction ([`TimeSeries`] invariant), so each
//! observation costs one binary search: `O(m · log n)` per table.
//!
//! ## See also
//! ------------
//! * [`masking::MaskingStage`] – joins masking flags onto the reference through
//!   [`TemporalMatcher::nearest_lookup`].
use std::fmt;

use hifitime::Duration;

use crate::constants::MJD;
use crate::datasets::TimeSeries;
use crate::time::duration_to_days;

pub mod masking;

/// Column of a combined table: which dataset it came from, and its name there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId {
    pub dataset: String,
    pub column: String,
}

impl ColumnId {
    pub fn new(dataset: &str, column: &str) -> Self {
        ColumnId {
            dataset: dataset.to_string(),
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.column)
    }
}

/// Table of several datasets aligned on the reference timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombinedTable {
    times: Vec<MJD>,
    columns: Vec<(ColumnId, Vec<f64>)>,
}

impl CombinedTable {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[MJD] {
        &self.times
    }

    pub fn columns(&self) -> &[(ColumnId, Vec<f64>)] {
        &self.columns
    }

    pub fn column_ids(&self) -> impl Iterator<Item = &ColumnId> {
        self.columns.iter().map(|(id, _)| id)
    }

    pub fn column(&self, id: &ColumnId) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(c, _)| c == id)
            .map(|(_, v)| v.as_slice())
    }

    pub(crate) fn replace_column(&mut self, id: &ColumnId, values: Vec<f64>) {
        if let Some((_, v)) = self.columns.iter_mut().find(|(c, _)| c == id) {
            debug_assert_eq!(v.len(), values.len());
            *v = values;
        }
    }

    /// Rows where every column of `ids` holds a value.
    ///
    /// Return
    /// ----------
    /// * `Some((times, columns))` with `columns` in the order of `ids`, or `None` if one
    ///   of the ids is not part of the table.
    pub fn complete_rows(&self, ids: &[ColumnId]) -> Option<(Vec<MJD>, Vec<Vec<f64>>)> {
        let selected: Vec<&[f64]> = ids.iter().map(|id| self.column(id)).collect::<Option<_>>()?;

        let rows: Vec<usize> = (0..self.len())
            .filter(|&r| selected.iter().all(|col| !col[r].is_nan()))
            .collect();

        let times = rows.iter().map(|&r| self.times[r]).collect();
        let columns = selected
            .iter()
            .map(|col| rows.iter().map(|&r| col[r]).collect())
            .collect();
        Some((times, columns))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalMatcher {
    window: Duration,
}

impl TemporalMatcher {
    pub fn new(window: Duration) -> Self {
        TemporalMatcher { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// For each reference timestamp, the row of `other` attached to it, if any.
    ///
    /// Arguments
    /// -----------------
    /// * `reference` – sorted reference timestamps (MJD).
    /// * `other` – the table to align; its rows are sorted by time.
    ///
    /// Return
    /// ----------
    /// * A vector of `reference.len()` entries holding the matched row index of `other`.
    pub fn nearest_assignment(&self, reference: &[MJD], other: &TimeSeries) -> Vec<Option<usize>> {
        let window = duration_to_days(self.window);
        let mut assigned: Vec<Option<(usize, f64)>> = vec![None; reference.len()];
        if reference.is_empty() {
            return Vec::new();
        }

        for (row, &t) in other.times().iter().enumerate() {
            if !other.row_has_data(row) {
                continue;
            }

            // First reference instant at or after t; its predecessor is the other candidate.
            let after = reference.partition_point(|r| *r < t);
            let candidates = [after.checked_sub(1), (after < reference.len()).then_some(after)];
            let Some((ref_idx, distance)) = candidates
                .into_iter()
                .flatten()
                .map(|i| (i, (reference[i] - t).abs()))
                .fold(None, |best: Option<(usize, f64)>, cand| match best {
                    Some(b) if b.1 <= cand.1 => Some(b),
                    _ => Some(cand),
                })
            else {
                continue;
            };

            if distance > window {
                continue;
            }
            // Rows arrive in time order, so keeping strict improvements favours the earliest.
            match assigned[ref_idx] {
                Some((_, best)) if best <= distance => {}
                _ => assigned[ref_idx] = Some((row, distance)),
            }
        }

        assigned.into_iter().map(|a| a.map(|(row, _)| row)).collect()
    }

    /// For each reference timestamp, the nearest row of `other` within the window.
    ///
    /// Unlike [`nearest_assignment`](TemporalMatcher::nearest_assignment), one row of
    /// `other` may serve several reference timestamps, and rows are not skipped for
    /// missing values. Equidistant rows: the earlier one wins.
    pub fn nearest_lookup(&self, reference: &[MJD], other: &TimeSeries) -> Vec<Option<usize>> {
        let window = duration_to_days(self.window);
        let times = other.times();

        reference
            .iter()
            .map(|&t| {
                let after = times.partition_point(|o| *o < t);
                [after.checked_sub(1), (after < times.len()).then_some(after)]
                    .into_iter()
                    .flatten()
                    .map(|i| (i, (times[i] - t).abs()))
                    .fold(None, |best: Option<(usize, f64)>, cand| match best {
                        Some(b) if b.1 <= cand.1 => Some(b),
                        _ => Some(cand),
                    })
                    .filter(|(_, distance)| *distance <= window)
                    .map(|(row, _)| row)
            })
            .collect()
    }

    /// Align `others` to the timestamps of `reference`.
    ///
    /// Arguments
    /// -----------------
    /// * `reference` – `(dataset name, table)` of the temporal reference.
    /// * `others` – `(dataset name, table)` of the datasets to align.
    ///
    /// Return
    /// ----------
    /// * A [`CombinedTable`] holding the reference columns followed by every other
    ///   dataset's columns, in the given order.
    pub fn match_tables(
        &self,
        reference: (&str, &TimeSeries),
        others: &[(&str, &TimeSeries)],
    ) -> CombinedTable {
        let (ref_name, ref_table) = reference;
        let assignments: Vec<Vec<Option<usize>>> = others
            .iter()
            .map(|(_, table)| self.nearest_assignment(ref_table.times(), table))
            .collect();

        let rows: Vec<usize> = (0..ref_table.len())
            .filter(|&r| others.is_empty() || assignments.iter().any(|a| a[r].is_some()))
            .collect();

        let mut columns: Vec<(ColumnId, Vec<f64>)> = ref_table
            .columns()
            .iter()
            .map(|(name, values)| {
                (
                    ColumnId::new(ref_name, name),
                    rows.iter().map(|&r| values[r]).collect(),
                )
            })
            .collect();

        for ((other_name, table), assignment) in others.iter().zip(&assignments) {
            for (name, values) in table.columns() {
                let aligned = rows
                    .iter()
                    .map(|&r| assignment[r].map_or(f64::NAN, |o| values[o]))
                    .collect();
                columns.push((ColumnId::new(other_name, name), aligned));
            }
        }

        CombinedTable {
            times: rows.iter().map(|&r| ref_table.times()[r]).collect(),
            columns,
        }
    }
}
