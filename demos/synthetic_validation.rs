//! Validate two synthetic satellite products against a synthetic in-situ network.
//!
//! Run with `RUST_LOG=geoval=debug cargo run --example synthetic_validation` to see the
//! per-job stages. Results are written in long CSV format to the system temp directory.
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use camino::Utf8PathBuf;
use geoval::datasets::spatial::haversine_distance;
use geoval::datasets::{GridPoint, Location, ReadError, ReadOptions, SpatialIndex};
use geoval::metrics::{MetricInput, MetricMap, MetricsCalculator};
use geoval::scaling::{ScalingConfig, ScalingMethod};
use geoval::validation::results::CsvSink;
use geoval::{
    DatasetConfig, DatasetReader, GeovalError, Job, LocationId, TimeSeries, Validation,
    ValidationParams,
};
use hifitime::{Epoch, Unit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::info;
use tracing_subscriber::EnvFilter;

const MJD_2018: f64 = 58119.0;
const DAYS: usize = 2 * 365;

/// Seasonal soil moisture cycle, its phase drifting slowly with longitude.
fn truth(lon: f64, t: f64) -> f64 {
    let phase = (lon - 15.0) * 0.3;
    0.25 + 0.1 * ((t - MJD_2018) * std::f64::consts::TAU / 365.25 + phase).sin()
}

/// One column sampled every `step` days, as `gain · truth + offset + noise`.
fn product(lon: f64, step: f64, gain: f64, offset: f64, sigma: f64, seed: u64) -> TimeSeries {
    let mut rng = StdRng::seed_from_u64(seed ^ lon.to_bits());
    let noise = Normal::new(0.0, sigma).unwrap();
    let n = (DAYS as f64 / step) as usize;
    let times: Vec<f64> = (0..n)
        .map(|i| MJD_2018 + i as f64 * step + rng.random_range(0.0..0.1) * step)
        .collect();
    let values = times
        .iter()
        .map(|t| gain * truth(lon, *t) + offset + noise.sample(&mut rng))
        .collect();
    TimeSeries::new(times, vec![("sm".to_string(), values)]).unwrap()
}

/// In-situ stations, addressed by station number.
struct Stations {
    series: HashMap<LocationId, TimeSeries>,
}

impl DatasetReader for Stations {
    fn available_columns(&self) -> Vec<String> {
        vec!["sm".into()]
    }

    fn read(&self, location: &Location, _: &ReadOptions) -> Result<TimeSeries, ReadError> {
        match location {
            Location::Id(id) => self.series.get(id).cloned().ok_or(ReadError::NoData),
            Location::Coordinates { .. } => {
                Err(ReadError::Failed("stations are read by id".into()))
            }
        }
    }
}

/// Gridded satellite product with a regular 0.25° grid around the stations.
struct Swath {
    grid: Grid,
    gain: f64,
    offset: f64,
    sigma: f64,
    step: f64,
    seed: u64,
}

struct Grid {
    points: Vec<GridPoint>,
}

impl SpatialIndex for Grid {
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

impl DatasetReader for Swath {
    fn available_columns(&self) -> Vec<String> {
        vec!["sm".into()]
    }

    fn read(&self, location: &Location, _: &ReadOptions) -> Result<TimeSeries, ReadError> {
        let Location::Id(id) = location else {
            return Err(ReadError::NoData);
        };
        let point = self
            .grid
            .points
            .iter()
            .find(|p| &p.id == id)
            .ok_or(ReadError::NoData)?;
        Ok(product(
            point.lon,
            self.step,
            self.gain,
            self.offset,
            self.sigma,
            self.seed,
        ))
    }

    fn spatial_index(&self) -> Option<&dyn SpatialIndex> {
        Some(&self.grid)
    }
}

/// Pearson R, bias and unbiased RMSD against the reference column.
struct BasicMetrics;

impl MetricsCalculator for BasicMetrics {
    fn arity(&self) -> usize {
        2
    }

    fn min_obs(&self) -> usize {
        10
    }

    fn calc(&self, input: &MetricInput, _: &Job) -> Result<MetricMap, GeovalError> {
        let x = input.reference();
        let y = input
            .column("k1")
            .ok_or_else(|| GeovalError::Calculator("missing column k1".into()))?;
        let n = x.len() as f64;
        let mx = x.iter().sum::<f64>() / n;
        let my = y.iter().sum::<f64>() / n;

        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for (a, b) in x.iter().zip(y) {
            sxy += (a - mx) * (b - my);
            sxx += (a - mx).powi(2);
            syy += (b - my).powi(2);
        }
        let ubrmsd = (x
            .iter()
            .zip(y)
            .map(|(a, b)| ((b - my) - (a - mx)).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let mut out = MetricMap::new();
        out.insert("R".into(), (sxy / (sxx * syy).sqrt()).into());
        out.insert("bias".into(), (my - mx).into());
        out.insert("ubRMSD".into(), ubrmsd.into());
        Ok(out)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geoval=info")),
        )
        .init();

    let station_coords: Vec<(u64, f64, f64)> = (0..8)
        .map(|i| (i, 15.0 + 0.3 * i as f64, 47.0 + 0.2 * i as f64))
        .collect();

    let stations = Stations {
        series: station_coords
            .iter()
            .map(|(id, lon, _)| {
                (
                    LocationId::Index(*id),
                    product(*lon, 1.0 / 24.0, 1.0, 0.0, 0.01, 7),
                )
            })
            .collect(),
    };

    let grid = || Grid {
        points: (0..16)
            .flat_map(|i| (0..16).map(move |j| (i, j)))
            .map(|(i, j)| GridPoint {
                id: LocationId::Index(i * 16 + j),
                lon: 14.5 + 0.25 * i as f64,
                lat: 46.5 + 0.25 * j as f64,
            })
            .collect(),
    };

    let ascat = Swath {
        grid: grid(),
        gain: 100.0,
        offset: 5.0,
        sigma: 3.0,
        step: 0.5,
        seed: 11,
    };
    let smos = Swath {
        grid: grid(),
        gain: 1.0,
        offset: 0.03,
        sigma: 0.04,
        step: 1.5,
        seed: 23,
    };

    let params = ValidationParams::builder()
        .temporal_window(Unit::Hour * 2)
        .max_distance_m(35_000.0)
        .period(
            Epoch::from_gregorian_utc_at_midnight(2018, 1, 1),
            Epoch::from_gregorian_utc_at_midnight(2019, 6, 30),
        )
        .build()?;
    println!("{params:#}");

    let validation = Validation::builder()
        .dataset(DatasetConfig::new("ismn", Arc::new(stations), &["sm"]))
        .dataset(DatasetConfig::new("ascat", Arc::new(ascat), &["sm"]))
        .dataset(DatasetConfig::new("smos", Arc::new(smos), &["sm"]))
        .scaling(ScalingConfig::new(ScalingMethod::CdfMatch, "ismn"))
        .metrics_calculator((2, 2), Arc::new(BasicMetrics))
        .params(params)
        .build()?;

    let path = Utf8PathBuf::from_path_buf(std::env::temp_dir().join("geoval_synthetic.csv"))
        .map_err(|p| format!("non UTF-8 temp path: {}", p.display()))?;
    let mut sink = CsvSink::create(&path)?;

    let jobs = station_coords
        .iter()
        .map(|(id, lon, lat)| Job::new(*id, *lon, *lat));
    let summary = validation.process_jobs(jobs, &mut sink)?;

    info!(%summary, path = %path, "validation finished");
    Ok(())
}
