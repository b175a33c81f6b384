//! # Per-job processing
//!
//! [`Validation::process`] runs one job through a fixed sequence of stages:
//!
//! ```text
//! INIT → READ → MASK → MATCH → SCALE → [ANOMALY] → COMPUTE → DONE
//!          │
//!          └────────→ ABORT   (temporal reference unavailable, or no comparison data)
//! ```
//!
//! * **READ** – every registered dataset is read at its resolved location; failures
//!   become unavailable markers.
//! * **MASK** – the temporal reference is filtered by the available masking datasets.
//! * **MATCH / SCALE** – once per dataset group of the [`CombinationPlan`]: the group
//!   is aligned on the masked reference, then scaled. Groups containing an unavailable
//!   dataset are skipped and produce no records.
//! * **ANOMALY** – only with [`ValidationParams::anomaly`](crate::validation::ValidationParams)
//!   set: every scaled column is replaced by its anomaly.
//! * **COMPUTE** – each key of the group is restricted to its complete rows and
//!   handed to the calculator of its binding through [`dispatch`].
//!
//! A job only depends on the job and the immutable [`Validation`], so jobs can be
//! processed concurrently ([`Validation::process_jobs_par`] with the `parallel`
//! feature).
//!
//! ## See also
//! ------------
//! * [`Validation::process_jobs`] – sequential batch driver writing to a
//!   [`ResultsSink`].
use std::fmt;

use tracing::{debug, info, info_span};

use crate::combinations::CombinationPlan;
use crate::datasets::data_manager::{ReadingResult, Readings};
use crate::datasets::{Job, TimeSeries};
use crate::geoval_errors::GeovalError;
use crate::metrics::{dispatch, MetricInput};
use crate::scaling::ScaledTable;
use crate::validation::results::{BatchSummary, JobAbort, JobResults, ResultsSink};
use crate::validation::Validation;

#[cfg(feature = "progress")]
use crate::validation::progress_bar::JobTimer;
#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

/// Stages of [`Validation::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Init,
    Read,
    Mask,
    Match,
    Scale,
    Anomaly,
    Compute,
    Done,
    Abort,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Init => "INIT",
            JobStage::Read => "READ",
            JobStage::Mask => "MASK",
            JobStage::Match => "MATCH",
            JobStage::Scale => "SCALE",
            JobStage::Anomaly => "ANOMALY",
            JobStage::Compute => "COMPUTE",
            JobStage::Done => "DONE",
            JobStage::Abort => "ABORT",
        };
        f.write_str(name)
    }
}

struct StageTracker {
    stage: JobStage,
}

impl StageTracker {
    fn enter(&mut self, next: JobStage) {
        debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }
}

impl Validation {
    /// Validate one job.
    ///
    /// Arguments
    /// -----------------
    /// * `job` – location identifier (of the spatial reference) and coordinates.
    ///
    /// Return
    /// ----------
    /// * The [`JobResults`]: one [`MetricRecord`](crate::metrics::MetricRecord) per computed key, or an empty mapping
    ///   with [`JobResults::abort`] set when the job cannot be validated at all.
    pub fn process(&self, job: &Job) -> JobResults {
        let span = info_span!("job", gpi = %job.gpi);
        let _guard = span.enter();
        let mut tracker = StageTracker {
            stage: JobStage::Init,
        };

        tracker.enter(JobStage::Read);
        let readings = self.data_manager.read_all(job);

        let reference = match readings.get(&self.temporal_reference) {
            Some(ReadingResult::Available(table)) => table,
            Some(ReadingResult::Unavailable(reason)) => {
                tracker.enter(JobStage::Abort);
                return JobResults::aborted(JobAbort::ReferenceUnavailable(reason.clone()));
            }
            None => {
                tracker.enter(JobStage::Abort);
                return JobResults::aborted(JobAbort::NoComparisonData);
            }
        };
        if !self.has_comparison_data(&readings) {
            tracker.enter(JobStage::Abort);
            return JobResults::aborted(JobAbort::NoComparisonData);
        }

        tracker.enter(JobStage::Mask);
        let masks: Vec<(&str, Option<&TimeSeries>)> = self
            .data_manager
            .datasets()
            .iter()
            .filter(|d| d.is_masking)
            .map(|d| (d.name.as_str(), readings.get(&d.name).and_then(ReadingResult::table)))
            .collect();
        let masked;
        let reference = if masks.is_empty() {
            reference
        } else {
            masked = self.masking.apply(reference, &masks);
            &masked
        };

        let mut results = JobResults::default();
        for (group_idx, group) in self.plan.groups().iter().enumerate() {
            tracker.enter(JobStage::Match);
            let others: Option<Vec<(&str, &TimeSeries)>> = group
                .others()
                .iter()
                .map(|name| {
                    readings
                        .get(name)
                        .and_then(ReadingResult::table)
                        .map(|t| (name.as_str(), t))
                })
                .collect();
            let Some(others) = others else {
                debug!(%group, "group skipped, a dataset is unavailable");
                continue;
            };
            let combined = self
                .matcher
                .match_tables((self.temporal_reference.as_str(), reference), &others);

            tracker.enter(JobStage::Scale);
            let mut scaled = match &self.scaler {
                Some(scaler) => scaler.scale(combined),
                None => ScaledTable::unscaled(combined),
            };
            if let Some(anomaly) = &self.params.anomaly {
                tracker.enter(JobStage::Anomaly);
                scaled.table = anomaly.apply_table(scaled.table);
            }

            tracker.enter(JobStage::Compute);
            for entry in self.plan.entries_for_group(group_idx) {
                let Some(calculator) = self.calculator(entry.binding) else {
                    continue;
                };
                let ids = entry.key.columns().to_vec();
                let (times, columns) = scaled
                    .table
                    .complete_rows(&ids)
                    .unwrap_or_else(|| (Vec::new(), vec![Vec::new(); ids.len()]));
                let scaling_failed = ids.iter().any(|id| scaled.failure(id).is_some());

                let input = MetricInput::new(times, ids, columns);
                let record = dispatch(calculator, &input, job, scaling_failed);
                results.insert(entry.key.clone(), record);
            }
        }

        tracker.enter(JobStage::Done);
        debug!(records = results.len(), "job processed");
        results
    }

    /// Whether a non-masking dataset other than the temporal reference is available.
    ///
    /// A configuration with the temporal reference as its only non-masking dataset
    /// needs no comparison data.
    fn has_comparison_data(&self, readings: &Readings) -> bool {
        let mut comparison = self
            .data_manager
            .datasets()
            .iter()
            .filter(|d| !d.is_masking && d.name != self.temporal_reference)
            .peekable();
        if comparison.peek().is_none() {
            return true;
        }
        comparison.any(|d| readings.get(&d.name).is_some_and(ReadingResult::is_available))
    }

    /// Process every job of `jobs` in order, handing each result to `sink`.
    ///
    /// Arguments
    /// -----------------
    /// * `jobs` – any job source.
    /// * `sink` – receives `(job, results)` for every job, then [`ResultsSink::finish`].
    ///
    /// Return
    /// ----------
    /// * A [`BatchSummary`], or the first error returned by the sink.
    #[cfg(feature = "progress")]
    pub fn process_jobs<I, S>(&self, jobs: I, sink: &mut S) -> Result<BatchSummary, GeovalError>
    where
        I: IntoIterator<Item = Job>,
        S: ResultsSink + ?Sized,
    {
        let jobs = jobs.into_iter();
        let total = jobs.size_hint().0 as u64;
        info!(jobs = total, "batch started");
        debug!(plan = %describe_plan(&self.plan), "combination plan");

        let pb = ProgressBar::new(total.max(1));
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
        ) {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(200));

        let mut summary = BatchSummary::default();
        let mut timer = JobTimer::new(0.2);
        for job in jobs {
            let results = self.process(&job);
            timer.tick();
            pb.set_message(timer.message());

            summary.add(&results);
            sink.accept(&job, &results)?;
            pb.inc(1);
        }
        pb.finish_and_clear();

        sink.finish()?;
        info!(%summary, "batch finished");
        Ok(summary)
    }

    /// Process every job of `jobs` in order, handing each result to `sink`.
    ///
    /// Arguments
    /// -----------------
    /// * `jobs` – any job source.
    /// * `sink` – receives `(job, results)` for every job, then [`ResultsSink::finish`].
    ///
    /// Return
    /// ----------
    /// * A [`BatchSummary`], or the first error returned by the sink.
    #[cfg(not(feature = "progress"))]
    pub fn process_jobs<I, S>(&self, jobs: I, sink: &mut S) -> Result<BatchSummary, GeovalError>
    where
        I: IntoIterator<Item = Job>,
        S: ResultsSink + ?Sized,
    {
        info!("batch started");
        debug!(plan = %describe_plan(&self.plan), "combination plan");
        let mut summary = BatchSummary::default();
        for job in jobs {
            let results = self.process(&job);
            summary.add(&results);
            sink.accept(&job, &results)?;
        }
        sink.finish()?;
        info!(%summary, "batch finished");
        Ok(summary)
    }

    /// Process `jobs` on the rayon thread pool; results keep the order of `jobs`.
    #[cfg(feature = "parallel")]
    pub fn process_jobs_par(&self, jobs: &[Job]) -> Vec<JobResults> {
        use rayon::prelude::*;

        info!(jobs = jobs.len(), "parallel batch started");
        jobs.par_iter().map(|job| self.process(job)).collect()
    }
}

/// Keys of `plan` grouped by binding, mainly for diagnostics.
pub fn describe_plan(plan: &CombinationPlan) -> String {
    plan.entries()
        .iter()
        .map(|e| format!("{} {}", e.binding, e.key))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod process_test {
    use std::sync::Arc;

    use super::*;
    use crate::datasets::{DatasetConfig, DatasetReader, Location, ReadError, ReadOptions};
    use crate::metrics::{MetricMap, MetricRecord, MetricsCalculator, RecordStatus};
    use crate::validation::results::MemorySink;

    struct Table(Option<TimeSeries>);

    impl DatasetReader for Table {
        fn available_columns(&self) -> Vec<String> {
            vec!["sm".into()]
        }

        fn read(&self, _: &Location, _: &ReadOptions) -> Result<TimeSeries, ReadError> {
            self.0.clone().ok_or(ReadError::NoData)
        }

        fn reads_coordinates(&self) -> bool {
            true
        }
    }

    struct Count;

    impl MetricsCalculator for Count {
        fn arity(&self) -> usize {
            2
        }

        fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
            let mut out = MetricMap::new();
            out.insert("count".into(), input.n_obs().into());
            Ok(out)
        }
    }

    fn series(times: &[f64]) -> Option<TimeSeries> {
        let values = times.iter().map(|t| t * 0.01).collect();
        Some(TimeSeries::new(times.to_vec(), vec![("sm".into(), values)]).unwrap())
    }

    fn validation(b: Option<TimeSeries>, c: Option<TimeSeries>) -> Validation {
        Validation::builder()
            .dataset(DatasetConfig::new("a", Arc::new(Table(series(&[1.0, 2.0, 3.0]))), &["sm"]))
            .dataset(DatasetConfig::new("b", Arc::new(Table(b)), &["sm"]))
            .dataset(DatasetConfig::new("c", Arc::new(Table(c)), &["sm"]))
            .metrics_calculator((2, 2), Arc::new(Count))
            .build()
            .unwrap()
    }

    #[test]
    fn test_unavailable_group_is_skipped() {
        let v = validation(series(&[1.0, 3.0]), None);
        let results = v.process(&Job::new(1_u64, 0.0, 0.0));

        assert_eq!(results.len(), 1);
        let (key, record) = results.records().iter().next().unwrap();
        assert_eq!(key.output_name(), "a.sm_with_b.sm");
        assert_eq!(record.n_obs, 2);
        assert_eq!(record.get("count").unwrap().as_f64(), Some(2.0));
        assert!(results.abort().is_none());
    }

    #[test]
    fn test_abort_without_comparison_data() {
        let v = validation(None, None);
        let results = v.process(&Job::new(1_u64, 0.0, 0.0));
        assert!(results.is_empty());
        assert_eq!(results.abort(), Some(&JobAbort::NoComparisonData));
    }

    #[test]
    fn test_zero_overlap_gives_zero_observations() {
        let v = validation(series(&[100.0]), series(&[2.0]));
        let results = v.process(&Job::new(1_u64, 0.0, 0.0));

        let records: Vec<&MetricRecord> = results.records().values().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].n_obs, 0);
        assert_eq!(records[0].status, RecordStatus::InsufficientData { required: 1 });
        assert_eq!(records[1].n_obs, 1);
        assert!(records[1].is_computed());
    }

    #[test]
    fn test_process_jobs_feeds_sink() {
        let v = validation(series(&[1.0]), series(&[2.0]));
        let jobs = vec![Job::new(1_u64, 0.0, 0.0), Job::new(2_u64, 1.0, 1.0)];
        let mut sink = MemorySink::new();

        let summary = v.process_jobs(jobs, &mut sink).unwrap();
        assert_eq!(summary.jobs, 2);
        assert_eq!(summary.records, 4);
        assert_eq!(summary.computed, 4);
        assert_eq!(sink.results.len(), 2);
        assert_eq!(sink.results[1].0.gpi.to_string(), "2");
    }

    #[test]
    fn test_describe_plan() {
        let v = validation(None, None);
        assert_eq!(
            describe_plan(v.plan()),
            "(2, 2) [(a, sm), (b, sm)]\n(2, 2) [(a, sm), (c, sm)]"
        );
    }
}
