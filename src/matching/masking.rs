//! Masking of the temporal reference.
//!
//! Every available masking dataset is joined onto the reference timestamps: each
//! reference row looks up the nearest mask observation within the matching window
//! ([`TemporalMatcher::nearest_lookup`]), so a coarse mask (e.g. a daily frozen flag)
//! covers every reference row around it. A reference row survives only if **every**
//! available mask has an observation for it and that observation is `false` (`0.0`).
//! Rows without one in some mask, or whose nearest flag is missing (`NaN`), are
//! dropped.
//!
//! Masks that could not be read for the job impose no constraint.
use tracing::debug;

use crate::datasets::TimeSeries;
use crate::matching::TemporalMatcher;

#[derive(Debug, Clone, Copy)]
pub struct MaskingStage {
    matcher: TemporalMatcher,
}

impl MaskingStage {
    pub fn new(matcher: TemporalMatcher) -> Self {
        MaskingStage { matcher }
    }

    /// Filter `reference` with the given masking tables.
    ///
    /// Arguments
    /// -----------------
    /// * `reference` – the temporal reference table.
    /// * `masks` – `(dataset name, table)` per masking dataset; `None` for a mask that is
    ///   unavailable for this job. Each table holds a single boolean column.
    ///
    /// Return
    /// ----------
    /// * The reference restricted to unmasked rows, possibly empty.
    pub fn apply(&self, reference: &TimeSeries, masks: &[(&str, Option<&TimeSeries>)]) -> TimeSeries {
        let mut keep = vec![true; reference.len()];

        for (name, mask) in masks {
            let Some(mask) = mask else {
                debug!(mask = %name, "masking dataset unavailable, no constraint applied");
                continue;
            };
            let Some((_, flags)) = mask.columns().first() else {
                continue;
            };

            let assignment = self.matcher.nearest_lookup(reference.times(), mask);
            for (k, matched) in keep.iter_mut().zip(assignment) {
                // Unmatched or missing flags drop the row: this is an inner join.
                let unmasked = matched.is_some_and(|row| flags[row] == 0.0);
                *k &= unmasked;
            }
        }

        let filtered = reference.filter_rows(&keep);
        debug!(
            before = reference.len(),
            after = filtered.len(),
            "masking applied to temporal reference"
        );
        filtered
    }
}

#[cfg(test)]
mod masking_test {
    use hifitime::Unit;

    use super::*;

    fn reference() -> TimeSeries {
        TimeSeries::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![("sm".into(), vec![0.1, 0.2, 0.3, 0.4])],
        )
        .unwrap()
    }

    fn stage() -> MaskingStage {
        MaskingStage::new(TemporalMatcher::new(Unit::Hour * 1))
    }

    #[test]
    fn test_all_masks_must_be_false() {
        let frozen = TimeSeries::from_flags(vec![1.0, 2.0, 3.0], "frozen", &[false, true, false])
            .unwrap();
        let snow = TimeSeries::from_flags(vec![1.0, 3.0, 4.0], "snow", &[false, true, false])
            .unwrap();

        let filtered = stage().apply(
            &reference(),
            &[("frozen", Some(&frozen)), ("snow", Some(&snow))],
        );
        // 2.0 frozen, 3.0 snow, 4.0 has no frozen flag
        assert_eq!(filtered.times(), &[1.0]);
        assert_eq!(filtered.column("sm").unwrap(), &[0.1]);
    }

    #[test]
    fn test_unavailable_mask_is_vacuous() {
        let filtered = stage().apply(&reference(), &[("frozen", None)]);
        assert_eq!(filtered, reference());
    }

    #[test]
    fn test_all_true_mask_empties_reference() {
        let frozen = TimeSeries::from_flags(
            vec![1.0, 2.0, 3.0, 4.0],
            "frozen",
            &[true, true, true, true],
        )
        .unwrap();
        let filtered = stage().apply(&reference(), &[("frozen", Some(&frozen))]);
        assert!(filtered.is_empty());
        assert_eq!(filtered.column_names().collect::<Vec<_>>(), vec!["sm"]);
    }

    #[test]
    fn test_missing_flag_drops_row() {
        let mask = TimeSeries::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![("frozen".into(), vec![0.0, 0.0, 0.0, f64::NAN])],
        )
        .unwrap();
        let filtered = stage().apply(&reference(), &[("frozen", Some(&mask))]);
        // the nearest flag of 4.0 is missing
        assert_eq!(filtered.times(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_coarse_mask_covers_several_rows() {
        let reference = TimeSeries::new(
            vec![0.0, 0.25, 0.5, 0.75],
            vec![("sm".into(), vec![0.1, 0.2, 0.3, 0.4])],
        )
        .unwrap();
        let stage = MaskingStage::new(TemporalMatcher::new(Unit::Hour * 12));

        let daily = TimeSeries::from_flags(vec![0.4], "frozen", &[false]).unwrap();
        let filtered = stage.apply(&reference, &[("frozen", Some(&daily))]);
        assert_eq!(filtered, reference);

        // 0.75 is closer to the frozen flag at 1.0
        let daily =
            TimeSeries::from_flags(vec![0.4, 1.0], "frozen", &[false, true]).unwrap();
        let filtered = stage.apply(&reference, &[("frozen", Some(&daily))]);
        assert_eq!(filtered.times(), &[0.0, 0.25, 0.5]);
    }
}
