mod common;

use std::sync::Arc;

use geoval::datasets::{DatasetConfig, ReadError};
use geoval::scaling::{ScalingConfig, ScalingMethod};
use geoval::validation::{Validation, ValidationBuilder, ValidationParams};
use geoval::GeovalError;
use hifitime::Epoch;

use crate::common::{daily_series, daily_signal, ColumnMeans, MemoryReader, PearsonCalculator};

fn reader(column: &str) -> Arc<MemoryReader> {
    let series = daily_series(column, daily_signal(20), 0.0);
    Arc::new(
        MemoryReader::new(&[column])
            .with_series(1_u64, series.clone())
            .reading_coordinates(series),
    )
}

fn base() -> ValidationBuilder {
    Validation::builder()
        .dataset(DatasetConfig::new("ismn", reader("sm"), &["sm"]))
        .dataset(DatasetConfig::new("ascat", reader("sm"), &["sm"]))
}

fn build_err(builder: ValidationBuilder) -> GeovalError {
    let err = builder.build().unwrap_err();
    assert!(err.is_configuration(), "not a configuration error: {err}");
    err
}

#[test]
fn test_unknown_columns() {
    let err = build_err(
        Validation::builder()
            .dataset(DatasetConfig::new("ismn", reader("sm"), &["sm", "ssm"]))
            .metrics_calculator((1, 1), Arc::new(ColumnMeans(1))),
    );
    assert_eq!(
        err,
        GeovalError::UnknownColumns {
            dataset: "ismn".into(),
            columns: vec!["ssm".into()]
        }
    );
}

#[test]
fn test_unknown_references() {
    let err = build_err(
        base()
            .temporal_reference("smap")
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(
        err,
        GeovalError::UnknownReference {
            role: "temporal".into(),
            name: "smap".into()
        }
    );

    let err = build_err(
        base()
            .scaling(ScalingConfig::new(ScalingMethod::MeanStd, "smap"))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(
        err,
        GeovalError::UnknownReference {
            role: "scaling".into(),
            name: "smap".into()
        }
    );

    let err = build_err(
        base()
            .scaling(ScalingConfig::new(ScalingMethod::MeanStd, "ismn").with_reference_column("ssm"))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert!(matches!(err, GeovalError::UnknownColumns { .. }));
}

#[test]
fn test_masking_dataset_cannot_be_a_reference() {
    let err = build_err(
        base()
            .masking_dataset(DatasetConfig::new("frozen", reader("flag"), &["flag"]))
            .spatial_reference("frozen")
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert!(matches!(err, GeovalError::UnknownReference { .. }));
}

#[test]
fn test_binding_errors() {
    let err = build_err(base().metrics_calculator((2, 2), Arc::new(ColumnMeans(3))));
    assert_eq!(err, GeovalError::ArityMismatch { n: 2, k: 2, arity: 3 });

    let err = build_err(base().metrics_calculator((3, 3), Arc::new(ColumnMeans(3))));
    assert!(matches!(err, GeovalError::InvalidBinding { n: 3, k: 3, .. }));

    let err = build_err(
        base()
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(err, GeovalError::DuplicateBinding { n: 2, k: 2 });

    let err = build_err(base());
    assert!(matches!(err, GeovalError::InvalidParameter(_)));
}

#[test]
fn test_duplicate_dataset() {
    let err = build_err(
        base()
            .dataset(DatasetConfig::new("ascat", reader("sm"), &["sm"]))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(err, GeovalError::DuplicateDataset("ascat".into()));
}

#[test]
fn test_unresolvable_location() {
    // no spatial index, no coordinate reads
    let stations = Arc::new(MemoryReader::new(&["sm"]));
    let err = build_err(
        base()
            .dataset(DatasetConfig::new("scan", stations, &["sm"]))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(err, GeovalError::UnresolvableLocation("scan".into()));
}

#[test]
fn test_triple_collocation_needs_triplets() {
    let err = build_err(
        base()
            .scaling(ScalingConfig::new(ScalingMethod::TripleCollocation, "ismn"))
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert!(matches!(err, GeovalError::IncompatibleScaling { .. }));
}

#[test]
fn test_invalid_params_are_rejected_at_build() {
    let params = ValidationParams {
        max_distance_m: Some(0.0),
        ..ValidationParams::default()
    };
    let err = build_err(
        base()
            .params(params)
            .metrics_calculator((2, 2), Arc::new(PearsonCalculator)),
    );
    assert_eq!(
        err,
        GeovalError::InvalidParameter("max_distance_m must be > 0".into())
    );
}

#[test]
fn test_valid_setup_with_period() {
    let params = ValidationParams::builder()
        .period(
            Epoch::from_gregorian_utc_hms(2020, 1, 4, 12, 0, 0),
            Epoch::from_gregorian_utc_hms(2020, 1, 10, 12, 0, 0),
        )
        .build()
        .unwrap();
    let validation = base()
        .dataset(DatasetConfig::new(
            "failing",
            Arc::new(MemoryReader::new(&["sm"]).failing(ReadError::NoData)),
            &["sm"],
        ))
        .scaling(ScalingConfig::new(ScalingMethod::LinReg, "ismn"))
        .metrics_calculator((2, 2), Arc::new(PearsonCalculator))
        .params(params)
        .build()
        .unwrap();

    assert_eq!(validation.plan().len(), 2);
    assert_eq!(validation.scaler().unwrap().min_obs(), 2);

    let results = validation.process(&geoval::Job::new(1_u64, 0.0, 0.0));
    let records: Vec<_> = results.records().values().collect();
    // the group with the failing dataset yields no record
    assert_eq!(records.len(), 1);
    // daily samples from 2020-01-05 to 2020-01-10
    assert_eq!(records[0].n_obs, 6);
}
