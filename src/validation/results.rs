//! Results of one job and sinks receiving them.
//!
//! * [`JobResults`] – combination key → [`MetricRecord`], plus the abort reason when
//!   the job produced nothing.
//! * [`ResultsSink`] – anything accepting `(job, results)` pairs from
//!   [`Validation::process_jobs`](crate::validation::Validation::process_jobs).
//! * [`MemorySink`] keeps everything in memory; [`CsvSink`] writes a long-format CSV
//!   with one line per metric value.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;

use camino::Utf8Path;
use serde::Serialize;

use crate::combinations::CombinationKey;
use crate::datasets::data_manager::UnavailableReason;
use crate::datasets::Job;
use crate::geoval_errors::GeovalError;
use crate::metrics::MetricRecord;

/// Why a job returned an empty results mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum JobAbort {
    /// The temporal reference could not be read.
    ReferenceUnavailable(UnavailableReason),
    /// No non-reference dataset could be read.
    NoComparisonData,
}

impl fmt::Display for JobAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAbort::ReferenceUnavailable(reason) => {
                write!(f, "temporal reference unavailable: {reason}")
            }
            JobAbort::NoComparisonData => f.write_str("no comparison dataset available"),
        }
    }
}

/// Output of [`Validation::process`](crate::validation::Validation::process).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobResults {
    records: BTreeMap<CombinationKey, MetricRecord>,
    abort: Option<JobAbort>,
}

impl JobResults {
    pub fn aborted(reason: JobAbort) -> Self {
        JobResults {
            records: BTreeMap::new(),
            abort: Some(reason),
        }
    }

    pub(crate) fn insert(&mut self, key: CombinationKey, record: MetricRecord) {
        self.records.insert(key, record);
    }

    pub fn records(&self) -> &BTreeMap<CombinationKey, MetricRecord> {
        &self.records
    }

    pub fn into_records(self) -> BTreeMap<CombinationKey, MetricRecord> {
        self.records
    }

    pub fn get(&self, key: &CombinationKey) -> Option<&MetricRecord> {
        self.records.get(key)
    }

    pub fn abort(&self) -> Option<&JobAbort> {
        self.abort.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Destination of batch results.
pub trait ResultsSink {
    fn accept(&mut self, job: &Job, results: &JobResults) -> Result<(), GeovalError>;

    /// Called once after the last job.
    fn finish(&mut self) -> Result<(), GeovalError> {
        Ok(())
    }
}

/// Keeps every `(job, results)` pair in processing order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<(Job, JobResults)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultsSink for MemorySink {
    fn accept(&mut self, job: &Job, results: &JobResults) -> Result<(), GeovalError> {
        self.results.push((job.clone(), results.clone()));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    key: &'a str,
    gpi: String,
    lon: f64,
    lat: f64,
    n_obs: usize,
    status: String,
    metric: &'a str,
    value: String,
}

/// Long-format CSV writer: `key, gpi, lon, lat, n_obs, status, metric, value`.
///
/// Records without metric values (insufficient data, calculator error) are written as
/// one line with empty `metric` and `value`.
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(path: &Utf8Path) -> Result<Self, GeovalError> {
        let writer = csv::Writer::from_path(path.as_std_path())?;
        Ok(CsvSink { writer })
    }
}

impl ResultsSink for CsvSink {
    fn accept(&mut self, _job: &Job, results: &JobResults) -> Result<(), GeovalError> {
        for (key, record) in results.records() {
            let name = key.output_name();
            let row = |metric: &'static str, value: String| CsvRow {
                key: &name,
                gpi: record.gpi.to_string(),
                lon: record.lon,
                lat: record.lat,
                n_obs: record.n_obs,
                status: record.status.to_string(),
                metric,
                value,
            };

            if record.values.is_empty() {
                self.writer.serialize(row("", String::new()))?;
                continue;
            }
            for (metric, value) in &record.values {
                self.writer.serialize(CsvRow {
                    metric: metric.as_str(),
                    ..row("", value.to_string())
                })?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), GeovalError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Counters of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub jobs: usize,
    pub aborted: usize,
    pub records: usize,
    pub computed: usize,
}

impl BatchSummary {
    pub(crate) fn add(&mut self, results: &JobResults) {
        self.jobs += 1;
        if results.abort().is_some() {
            self.aborted += 1;
        }
        self.records += results.len();
        self.computed += results
            .records()
            .values()
            .filter(|r| r.is_computed())
            .count();
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs ({} aborted), {} records ({} computed)",
            self.jobs, self.aborted, self.records, self.computed
        )
    }
}
