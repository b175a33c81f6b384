//! Validation of geophysical time series against each other.
//!
//! A [`Validation`] reads every registered dataset at a job location, masks the
//! temporal reference, matches the datasets in time, scales them into a common data
//! space, optionally turns them into anomalies, and hands the harmonized columns to user-provided metric calculators.
pub mod anomaly;
pub mod combinations;
pub mod constants;
pub mod datasets;
pub mod geoval_errors;
pub mod matching;
pub mod metrics;
pub mod scaling;
pub mod time;
pub mod validation;

pub use combinations::{Binding, CombinationKey};
pub use datasets::{DatasetConfig, DatasetReader, Job, LocationId, TimeSeries};
pub use geoval_errors::GeovalError;
pub use metrics::{MetricInput, MetricMap, MetricRecord, MetricValue, MetricsCalculator};
pub use scaling::{ScalingConfig, ScalingMethod};
pub use validation::results::{JobResults, ResultsSink};
pub use validation::{Validation, ValidationParams};
