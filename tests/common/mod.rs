#![allow(dead_code)]

use std::collections::HashMap;

use geoval::datasets::spatial::haversine_distance;
use geoval::datasets::{
    DatasetReader, GridPoint, Location, LocationId, ReadError, ReadOptions, SpatialIndex,
    TimeSeries,
};
use geoval::metrics::{MetricInput, MetricMap, MetricsCalculator};
use geoval::{GeovalError, Job};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// 2020-01-01T00:00:00 UTC
pub const MJD_2020: f64 = 58849.0;

/// In-memory reader serving one table per location identifier.
#[derive(Default)]
pub struct MemoryReader {
    columns: Vec<String>,
    series: HashMap<LocationId, TimeSeries>,
    coordinate_series: Option<TimeSeries>,
    index: Option<PointIndex>,
    error: Option<ReadError>,
}

impl MemoryReader {
    pub fn new(columns: &[&str]) -> Self {
        MemoryReader {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_series(mut self, id: impl Into<LocationId>, series: TimeSeries) -> Self {
        self.series.insert(id.into(), series);
        self
    }

    /// Serve `series` for coordinate-based reads.
    pub fn reading_coordinates(mut self, series: TimeSeries) -> Self {
        self.coordinate_series = Some(series);
        self
    }

    pub fn with_index(mut self, points: Vec<GridPoint>) -> Self {
        self.index = Some(PointIndex { points });
        self
    }

    pub fn failing(mut self, error: ReadError) -> Self {
        self.error = Some(error);
        self
    }
}

impl DatasetReader for MemoryReader {
    fn available_columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn read(&self, location: &Location, _: &ReadOptions) -> Result<TimeSeries, ReadError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match location {
            Location::Id(id) => self.series.get(id).cloned().ok_or(ReadError::NoData),
            Location::Coordinates { .. } => {
                self.coordinate_series.clone().ok_or(ReadError::NoData)
            }
        }
    }

    fn spatial_index(&self) -> Option<&dyn SpatialIndex> {
        self.index.as_ref().map(|i| i as &dyn SpatialIndex)
    }

    fn reads_coordinates(&self) -> bool {
        self.coordinate_series.is_some() || self.error.is_some()
    }
}

/// Brute-force nearest point lookup.
pub struct PointIndex {
    points: Vec<GridPoint>,
}

impl SpatialIndex for PointIndex {
    fn nearest(&self, lon: f64, lat: f64) -> Option<GridPoint> {
        self.points
            .iter()
            .min_by(|a, b| {
                haversine_distance(lon, lat, a.lon, a.lat)
                    .total_cmp(&haversine_distance(lon, lat, b.lon, b.lat))
            })
            .cloned()
    }
}

/// Pearson correlation, bias and RMSD of `k1` against `ref`.
pub struct PearsonCalculator;

impl MetricsCalculator for PearsonCalculator {
    fn arity(&self) -> usize {
        2
    }

    fn min_obs(&self) -> usize {
        3
    }

    fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
        let x = input.reference();
        let y = input
            .column("k1")
            .ok_or_else(|| GeovalError::Calculator("missing k1".into()))?;
        let n = x.len() as f64;
        let (mx, my) = (x.iter().sum::<f64>() / n, y.iter().sum::<f64>() / n);

        let (mut sxy, mut sxx, mut syy, mut sdd) = (0.0, 0.0, 0.0, 0.0);
        for (a, b) in x.iter().zip(y) {
            sxy += (a - mx) * (b - my);
            sxx += (a - mx).powi(2);
            syy += (b - my).powi(2);
            sdd += (b - a).powi(2);
        }

        let mut out = MetricMap::new();
        out.insert("R".into(), (sxy / (sxx * syy).sqrt()).into());
        out.insert("bias".into(), (my - mx).into());
        out.insert("rmsd".into(), (sdd / n).sqrt().into());
        Ok(out)
    }
}

/// Fails on every combination involving `dataset`, counts rows otherwise.
pub struct FailingOn(pub &'static str);

impl MetricsCalculator for FailingOn {
    fn arity(&self) -> usize {
        2
    }

    fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
        if input.column_ids().iter().any(|c| c.dataset == self.0) {
            return Err(GeovalError::Calculator(format!("cannot handle {}", self.0)));
        }
        let mut out = MetricMap::new();
        out.insert("n".into(), input.n_obs().into());
        Ok(out)
    }
}

/// Mean of every column, for any arity.
pub struct ColumnMeans(pub usize);

impl MetricsCalculator for ColumnMeans {
    fn arity(&self) -> usize {
        self.0
    }

    fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
        let mut out = MetricMap::new();
        for name in input.names() {
            let col = input.column(name).unwrap_or_default();
            out.insert(
                format!("mean_{name}"),
                (col.iter().sum::<f64>() / col.len() as f64).into(),
            );
        }
        Ok(out)
    }
}

/// Daily soil-moisture-like signal starting at [`MJD_2020`].
pub fn daily_signal(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.25 + 0.1 * (i as f64 * std::f64::consts::TAU / 365.0).sin())
        .collect()
}

/// Single-column table at `MJD_2020 + i + offset_days`.
pub fn daily_series(column: &str, values: Vec<f64>, offset_days: f64) -> TimeSeries {
    let times = (0..values.len())
        .map(|i| MJD_2020 + i as f64 + offset_days)
        .collect();
    TimeSeries::new(times, vec![(column.to_string(), values)]).unwrap()
}

/// `scale · signal + offset` plus seeded Gaussian noise.
pub fn noisy_copy(signal: &[f64], scale: f64, offset: f64, sigma: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    signal
        .iter()
        .map(|s| scale * s + offset + noise.sample(&mut rng))
        .collect()
}
