use thiserror::Error;

use crate::datasets::data_manager::UnavailableReason;

#[derive(Error, Debug)]
pub enum GeovalError {
    #[error("Dataset registered twice: {0}")]
    DuplicateDataset(String),

    #[error("Unknown {role} reference dataset: {name}")]
    UnknownReference { role: String, name: String },

    #[error("Dataset {dataset} does not provide the columns {columns:?}")]
    UnknownColumns {
        dataset: String,
        columns: Vec<String>,
    },

    #[error("Dataset {0} is registered without any column")]
    EmptyColumns(String),

    #[error("Invalid metrics binding ({n}, {k}): {reason}")]
    InvalidBinding { n: usize, k: usize, reason: String },

    #[error("Metrics binding ({n}, {k}) registered more than once")]
    DuplicateBinding { n: usize, k: usize },

    #[error("Calculator bound to ({n}, {k}) declares an arity of {arity}")]
    ArityMismatch { n: usize, k: usize, arity: usize },

    #[error("Bindings {first:?} and {second:?} both produce the combination {key}")]
    OverlappingBindings {
        first: (usize, usize),
        second: (usize, usize),
        key: String,
    },

    #[error("No way to locate dataset {0}: it has no spatial index and cannot read by coordinates")]
    UnresolvableLocation(String),

    #[error("Invalid masking dataset {dataset}: {reason}")]
    InvalidMaskingDataset { dataset: String, reason: String },

    #[error("Invalid validation parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown scaling method: {0}")]
    InvalidScalingMethod(String),

    #[error("Scaling method {method} cannot be applied: {reason}")]
    IncompatibleScaling { method: String, reason: String },

    #[error("Invalid time series: {0}")]
    InvalidTimeSeries(String),

    #[error("Dataset {dataset} unavailable: {reason}")]
    DatasetUnavailable {
        dataset: String,
        reason: UnavailableReason,
    },

    #[error("Not enough data to scale {column}: {available} samples, {required} required")]
    InsufficientData {
        column: String,
        available: usize,
        required: usize,
    },

    #[error("Scaling of {column} is degenerate: {reason}")]
    DegenerateScaling { column: String, reason: String },

    #[error("Metrics calculator failed: {0}")]
    Calculator(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV writer error: {0}")]
    CsvError(#[from] csv::Error),
}

impl GeovalError {
    /// Whether this error belongs to the setup-time configuration family.
    ///
    /// Configuration errors are raised by [`ValidationBuilder::build`](crate::validation::ValidationBuilder::build)
    /// before any job runs; every other variant is recovered below the job boundary or
    /// comes from a results sink.
    pub fn is_configuration(&self) -> bool {
        use GeovalError::*;
        matches!(
            self,
            DuplicateDataset(_)
                | UnknownReference { .. }
                | UnknownColumns { .. }
                | EmptyColumns(_)
                | InvalidBinding { .. }
                | DuplicateBinding { .. }
                | ArityMismatch { .. }
                | OverlappingBindings { .. }
                | UnresolvableLocation(_)
                | InvalidMaskingDataset { .. }
                | InvalidParameter(_)
                | InvalidScalingMethod(_)
                | IncompatibleScaling { .. }
                | InvalidTimeSeries(_)
        )
    }
}

impl PartialEq for GeovalError {
    fn eq(&self, other: &Self) -> bool {
        use GeovalError::*;
        match (self, other) {
            (DuplicateDataset(a), DuplicateDataset(b)) => a == b,
            (
                UnknownReference { role: r1, name: n1 },
                UnknownReference { role: r2, name: n2 },
            ) => r1 == r2 && n1 == n2,
            (
                UnknownColumns {
                    dataset: d1,
                    columns: c1,
                },
                UnknownColumns {
                    dataset: d2,
                    columns: c2,
                },
            ) => d1 == d2 && c1 == c2,
            (EmptyColumns(a), EmptyColumns(b)) => a == b,
            (
                InvalidBinding {
                    n: n1,
                    k: k1,
                    reason: r1,
                },
                InvalidBinding {
                    n: n2,
                    k: k2,
                    reason: r2,
                },
            ) => n1 == n2 && k1 == k2 && r1 == r2,
            (DuplicateBinding { n: n1, k: k1 }, DuplicateBinding { n: n2, k: k2 }) => {
                n1 == n2 && k1 == k2
            }
            (
                ArityMismatch {
                    n: n1,
                    k: k1,
                    arity: a1,
                },
                ArityMismatch {
                    n: n2,
                    k: k2,
                    arity: a2,
                },
            ) => n1 == n2 && k1 == k2 && a1 == a2,
            (
                OverlappingBindings {
                    first: f1,
                    second: s1,
                    key: k1,
                },
                OverlappingBindings {
                    first: f2,
                    second: s2,
                    key: k2,
                },
            ) => f1 == f2 && s1 == s2 && k1 == k2,
            (UnresolvableLocation(a), UnresolvableLocation(b)) => a == b,
            (
                InvalidMaskingDataset {
                    dataset: d1,
                    reason: r1,
                },
                InvalidMaskingDataset {
                    dataset: d2,
                    reason: r2,
                },
            ) => d1 == d2 && r1 == r2,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (InvalidScalingMethod(a), InvalidScalingMethod(b)) => a == b,
            (
                IncompatibleScaling {
                    method: m1,
                    reason: r1,
                },
                IncompatibleScaling {
                    method: m2,
                    reason: r2,
                },
            ) => m1 == m2 && r1 == r2,
            (InvalidTimeSeries(a), InvalidTimeSeries(b)) => a == b,
            (
                DatasetUnavailable {
                    dataset: d1,
                    reason: r1,
                },
                DatasetUnavailable {
                    dataset: d2,
                    reason: r2,
                },
            ) => d1 == d2 && r1 == r2,
            (
                InsufficientData {
                    column: c1,
                    available: a1,
                    required: q1,
                },
                InsufficientData {
                    column: c2,
                    available: a2,
                    required: q2,
                },
            ) => c1 == c2 && a1 == a2 && q1 == q2,
            (
                DegenerateScaling {
                    column: c1,
                    reason: r1,
                },
                DegenerateScaling {
                    column: c2,
                    reason: r2,
                },
            ) => c1 == c2 && r1 == r2,
            (Calculator(a), Calculator(b)) => a == b,

            // I/O and CSV errors are not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            _ => false,
        }
    }
}
