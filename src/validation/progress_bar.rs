//! Per-job timing for the batch progress bar (feature `progress`).
//!
//! [`JobTimer`] measures the wall time between two calls of [`JobTimer::tick`] and keeps
//! an exponential moving average of it:
//!
//! ```text
//! ema ← α·dt + (1 − α)·ema      α ∈ (0, 1]
//! ```
//!
//! The first tick seeds the average. `α = 1` disables smoothing.
use std::time::{Duration, Instant};

pub struct JobTimer {
    last: Instant,
    last_dt: Duration,
    ema_ns: f64,
    alpha: f64,
    ticks: u64,
}

impl JobTimer {
    pub fn new(alpha: f64) -> Self {
        JobTimer {
            last: Instant::now(),
            last_dt: Duration::ZERO,
            ema_ns: 0.0,
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            ticks: 0,
        }
    }

    /// Close the current interval and return its duration.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.record(now.duration_since(self.last));
        self.last = now;
        self.last_dt
    }

    fn record(&mut self, dt: Duration) {
        let dt_ns = dt.as_nanos() as f64;
        self.ticks += 1;
        self.ema_ns = if self.ticks == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        self.last_dt = dt;
    }

    pub fn average(&self) -> Duration {
        if self.ticks == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }

    /// Progress bar message, e.g. `last job: 12ms, avg: 9ms`.
    pub fn message(&self) -> String {
        format!(
            "last job: {}, avg: {}",
            fmt_dur(self.last_dt),
            fmt_dur(self.average())
        )
    }
}

/// Short human-readable duration: `µs` below a millisecond, `ms` below a second.
pub fn fmt_dur(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f32()),
    }
}

#[cfg(test)]
mod progress_bar_test {
    use super::*;

    #[test]
    fn test_fmt_dur() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_first_tick_measures_first_job() {
        let mut timer = JobTimer::new(0.2);
        std::thread::sleep(Duration::from_millis(5));
        let first = timer.tick();
        assert!(first >= Duration::from_millis(5));
        assert_eq!(timer.average(), first);
    }

    #[test]
    fn test_moving_average() {
        let mut timer = JobTimer::new(0.5);
        assert_eq!(timer.average(), Duration::ZERO);

        timer.record(Duration::from_millis(10));
        assert_eq!(timer.average(), Duration::from_millis(10));
        timer.record(Duration::from_millis(30));
        assert_eq!(timer.average(), Duration::from_millis(20));
        assert_eq!(timer.message(), "last job: 30ms, avg: 20ms");
    }
}
