//! Seasonal synthetic history, the final tier that always succeeds

use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, StandardNormal};
use std::f64::consts::PI;

use crate::models::{DataSource, HistoricalSeries, Observation};

/// Days generated, ending on the reference date
pub const SYNTHETIC_DAYS: usize = 365;

/// Climatological mean temperature per calendar month, January first
const MONTHLY_BASELINE_C: [f64; 12] = [
    -2.0, 1.0, 7.0, 15.0, 21.0, 26.0, 29.0, 28.0, 23.0, 16.0, 7.0, 0.0,
];

fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + std_dev * z
}

fn monthly_baseline(date: NaiveDate) -> f64 {
    MONTHLY_BASELINE_C[date.month0() as usize]
}

/// Generate [`SYNTHETIC_DAYS`] days ending on `end`.
///
/// The same `seed` always yields the same series.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn generate(end: NaiveDate, seed: Option<u64>) -> HistoricalSeries {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let start = end - Duration::days(SYNTHETIC_DAYS as i64 - 1);
    let dates: Vec<NaiveDate> = (0..SYNTHETIC_DAYS)
        .map(|i| start + Duration::days(i as i64))
        .collect();

    let temperatures: Vec<f64> = dates
        .iter()
        .enumerate()
        .map(|(i, date)| {
            let seasonal = 2.0 * (2.0 * PI * i as f64 / 30.0).sin();
            monthly_baseline(*date) + seasonal + normal(&mut rng, 0.0, 1.5)
        })
        .collect();

    let coldest = temperatures.iter().copied().fold(f64::INFINITY, f64::min);
    let warmest = temperatures.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // shape and scale are constants, so construction cannot fail in practice
    let rain = Gamma::new(1.2, 2.0).ok();

    let observations = dates
        .into_iter()
        .zip(temperatures)
        .enumerate()
        .map(|(i, (date, temperature_c))| {
            let t = i as f64;
            let tmin = temperature_c - rng.random_range(3.0..5.0);
            let tmax = temperature_c + rng.random_range(3.0..5.0);
            let warmth = 0.2 + (temperature_c - coldest) / (warmest - coldest + 1e-6);
            let precipitation_mm = rain
                .as_ref()
                .map_or(0.0, |g| g.sample(&mut rng) * warmth)
                .max(0.0);
            let humidity =
                (60.0 + 10.0 * (2.0 * PI * t / 10.0).sin() + normal(&mut rng, 0.0, 4.0)).clamp(45.0, 90.0);
            let wind_speed_ms =
                (3.0 + 2.0 * (2.0 * PI * t / 12.0).sin() + normal(&mut rng, 0.0, 0.8)).clamp(1.0, 9.0);

            Observation {
                date,
                temperature_c,
                tmin: Some(tmin),
                tmax: Some(tmax),
                precipitation_mm,
                humidity,
                wind_speed_ms,
            }
        })
        .collect();

    HistoricalSeries::new(DataSource::Synthetic, observations)
}
