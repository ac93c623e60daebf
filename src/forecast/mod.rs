//! Short-range forecasting
//!
//! A local forecast is built from the history alone (ARIMA, optionally
//! averaged with the sequence model for temperature). When the external
//! forecast service answers, each day is blended 0.85/0.15 in its favour;
//! otherwise the local values are used as they are.

pub mod arima;
pub mod sequence;
pub mod series;

use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::ModelConfig;
use crate::error::{Result, WeatherwiseError};
use crate::location_resolver::CoordinateResolver;
use crate::models::{BlendWeights, ForecastDay, FusionSource, HistoricalSeries, Provenance};
use crate::weather::{DailyRecord, RetryPolicy, WeatherSource};
use sequence::SequenceConfig;

/// Longest supported horizon in days
pub const MAX_FORECAST_DAYS: usize = 14;
/// Trailing days used for the tmax/tmin spread estimate
pub const SPREAD_WINDOW: usize = 30;
/// Spread used when history has no tmax/tmin
pub const DEFAULT_SPREAD: f64 = 4.5;
/// Trailing days averaged for local humidity and wind
pub const TRAILING_MEAN_DAYS: usize = 7;

/// Mean gap between the daily mean and the daily extremes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    /// `tmax - mean`
    pub above: f64,
    /// `mean - tmin`
    pub below: f64,
}

impl Default for Spread {
    fn default() -> Self {
        Self {
            above: DEFAULT_SPREAD,
            below: DEFAULT_SPREAD,
        }
    }
}

/// Spread over the trailing [`SPREAD_WINDOW`] days with both extremes present.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_spread(history: &HistoricalSeries) -> Spread {
    let pairs: Vec<(f64, f64)> = history
        .tail(SPREAD_WINDOW)
        .iter()
        .filter_map(|o| Some((o.tmax? - o.temperature_c, o.temperature_c - o.tmin?)))
        .collect();
    if pairs.is_empty() {
        return Spread::default();
    }
    let n = pairs.len() as f64;
    Spread {
        above: (pairs.iter().map(|p| p.0).sum::<f64>() / n).max(0.0),
        below: (pairs.iter().map(|p| p.1).sum::<f64>() / n).max(0.0),
    }
}

/// Model output before any external blending
#[derive(Debug, Clone, PartialEq)]
pub struct LocalForecast {
    pub temperature: Vec<f64>,
    pub precipitation: Vec<f64>,
}

/// Build the local forecast for `days` days from `history`.
#[must_use]
pub fn local_forecast(history: &HistoricalSeries, days: usize, model: &ModelConfig) -> LocalForecast {
    let dates = history.dates();
    let temperature = series::to_daily(&dates, &history.temperatures());
    let precipitation = series::to_daily(&dates, &history.precipitation());

    let primary = arima::forecast_series(&temperature, days);
    debug!(order = ?primary.order, bias = primary.bias, "temperature model fitted");
    let precipitation_fc = arima::forecast_series(&precipitation, days);

    let secondary = if model.sequence_model {
        let config = SequenceConfig {
            lookback: model.lookback,
            epochs: model.sequence_epochs,
            ..SequenceConfig::default()
        };
        sequence::sequence_forecast(&temperature, days, &config)
    } else {
        None
    };

    let temperature = match secondary {
        Some(seq) if seq.len() == days => primary
            .values
            .iter()
            .zip(&seq)
            .map(|(a, s)| (a + s) / 2.0)
            .collect(),
        _ => primary.values,
    };

    LocalForecast {
        temperature,
        precipitation: precipitation_fc.values,
    }
}

/// One external forecast day with a usable mean temperature
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDay {
    pub date: NaiveDate,
    pub temperature_c: f64,
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed_ms: Option<f64>,
}

impl ExternalDay {
    /// `None` when the record has no mean temperature.
    #[must_use]
    pub fn from_record(record: &DailyRecord) -> Option<Self> {
        Some(Self {
            date: record.date,
            temperature_c: record.mean_temperature()?,
            tmax: record.tmax,
            tmin: record.tmin,
            precipitation_mm: record.precipitation_mm,
            humidity: record.humidity,
            wind_speed_ms: record.wind_speed_ms,
        })
    }
}

/// Keep `tmin <= mean <= tmax` after blending.
fn ordered(temperature: f64, tmax: f64, tmin: f64) -> (f64, f64) {
    (tmax.max(temperature), tmin.min(temperature))
}

/// Combine the local forecast with optional external days.
///
/// With external days, day `i` uses external day `min(i, len - 1)`; days past
/// the external coverage reuse the last external day and continue its dates.
/// Without them every day is local-only and dated after the last history day.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn fuse(
    history: &HistoricalSeries,
    local: &LocalForecast,
    external: Option<&[ExternalDay]>,
    days: usize,
) -> Vec<ForecastDay> {
    let spread = estimate_spread(history);
    let humidity_mean = history
        .trailing_mean(TRAILING_MEAN_DAYS, |o| o.humidity)
        .unwrap_or(crate::history::clean::DEFAULT_HUMIDITY);
    let wind_mean = history
        .trailing_mean(TRAILING_MEAN_DAYS, |o| o.wind_speed_ms)
        .unwrap_or(crate::history::clean::DEFAULT_WIND_SPEED_MS);
    let last_date = history.last_date().unwrap_or_default();
    let external = external.filter(|days| !days.is_empty());

    (0..days)
        .map(|i| {
            let local_temp = local.temperature.get(i).copied().unwrap_or_default();
            let local_precip = local.precipitation.get(i).copied().unwrap_or_default();

            let Some(ext_days) = external else {
                let (tmax, tmin) = ordered(local_temp, local_temp + spread.above, local_temp - spread.below);
                return ForecastDay {
                    date: last_date + Duration::days(i as i64 + 1),
                    temperature_c: local_temp,
                    tmax,
                    tmin,
                    precipitation_mm: local_precip.max(0.0),
                    humidity: humidity_mean,
                    wind_speed_ms: wind_mean,
                    provenance: Provenance {
                        external_temp: None,
                        external_precip: None,
                        local_temp,
                        local_precip,
                        weights: BlendWeights::LOCAL_ONLY,
                        data_source: FusionSource::LocalOnly,
                    },
                };
            };

            let index = i.min(ext_days.len() - 1);
            let ext = &ext_days[index];
            let date = ext.date + Duration::days((i - index) as i64);
            let weights = BlendWeights::EXTERNAL_FUSION;

            let temperature_c = weights.blend(ext.temperature_c, local_temp);
            let ext_precip = ext.precipitation_mm.unwrap_or(local_precip);
            let precipitation_mm = weights.blend(ext_precip, local_precip).max(0.0);
            let (tmax, tmin) = match (ext.tmax, ext.tmin) {
                (Some(ext_max), Some(ext_min)) => (
                    weights.blend(ext_max, temperature_c + spread.above),
                    weights.blend(ext_min, temperature_c - spread.below),
                ),
                _ => (temperature_c + spread.above, temperature_c - spread.below),
            };
            let (tmax, tmin) = ordered(temperature_c, tmax, tmin);

            ForecastDay {
                date,
                temperature_c,
                tmax,
                tmin,
                precipitation_mm,
                humidity: ext.humidity.unwrap_or(humidity_mean),
                wind_speed_ms: ext.wind_speed_ms.unwrap_or(wind_mean),
                provenance: Provenance {
                    external_temp: Some(ext.temperature_c),
                    external_precip: ext.precipitation_mm,
                    local_temp,
                    local_precip,
                    weights,
                    data_source: FusionSource::ExternalFusion,
                },
            }
        })
        .collect()
}

/// Produces fused forecasts for a city
pub struct ForecastEngine {
    resolver: Arc<CoordinateResolver>,
    source: Arc<dyn WeatherSource>,
    retry: RetryPolicy,
    model: ModelConfig,
}

impl ForecastEngine {
    pub fn new(
        resolver: Arc<CoordinateResolver>,
        source: Arc<dyn WeatherSource>,
        retry: RetryPolicy,
        model: ModelConfig,
    ) -> Self {
        Self {
            resolver,
            source,
            retry,
            model,
        }
    }

    /// Forecast `days` days (1..=14) for `city` from its history.
    #[instrument(skip(self, history), fields(rows = history.len()))]
    pub async fn forecast(
        &self,
        history: &HistoricalSeries,
        days: usize,
        city: &str,
    ) -> Result<Vec<ForecastDay>> {
        if !(1..=MAX_FORECAST_DAYS).contains(&days) {
            return Err(WeatherwiseError::validation(format!(
                "days must be between 1 and {MAX_FORECAST_DAYS}, got {days}"
            )));
        }
        if history.is_empty() {
            return Err(WeatherwiseError::insufficient("history is empty"));
        }

        let local = local_forecast(history, days, &self.model);
        let external = self.fetch_external(city, days).await;
        let forecast = fuse(history, &local, external.as_deref(), days);

        info!(
            city,
            days,
            fused = external.is_some(),
            "forecast produced"
        );
        Ok(forecast)
    }

    /// External forecast days, `None` when the service could not be used.
    async fn fetch_external(&self, city: &str, days: usize) -> Option<Vec<ExternalDay>> {
        let coordinate = self.resolver.resolve(city).await;
        let requested = u32::try_from(days.min(MAX_FORECAST_DAYS)).unwrap_or(1);
        let records = match self
            .retry
            .run("external forecast", || {
                self.source.forecast_daily(coordinate, requested)
            })
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(city, error = %e, "external forecast unavailable, using local model only");
                return None;
            }
        };

        let mut external: Vec<ExternalDay> =
            records.iter().filter_map(ExternalDay::from_record).collect();
        external.sort_by_key(|d| d.date);
        external.dedup_by_key(|d| d.date);
        if external.is_empty() {
            warn!(city, "external forecast had no usable days");
            return None;
        }
        if external.len() < days {
            debug!(covered = external.len(), days, "external forecast is short, reusing last day");
        }
        Some(external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataSource, Observation};

    fn history(days: usize, with_extremes: bool) -> HistoricalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let observations = (0..days)
            .map(|i| {
                let t = -5.0 + 35.0 * (i as f64 / (days - 1) as f64);
                Observation {
                    date: start + Duration::days(i as i64),
                    temperature_c: t,
                    tmin: with_extremes.then_some(t - 3.0),
                    tmax: with_extremes.then_some(t + 5.0),
                    precipitation_mm: if i % 5 == 0 { 4.0 } else { 0.0 },
                    humidity: 50.0 + (i % 3) as f64,
                    wind_speed_ms: 2.0,
                }
            })
            .collect();
        HistoricalSeries::new(DataSource::File, observations)
    }

    fn local(days: usize) -> LocalForecast {
        LocalForecast {
            temperature: vec![10.0; days],
            precipitation: vec![-1.0; days],
        }
    }

    #[test]
    fn test_spread_from_history() {
        let spread = estimate_spread(&history(60, true));
        assert!((spread.above - 5.0).abs() < 1e-9);
        assert!((spread.below - 3.0).abs() < 1e-9);

        assert_eq!(estimate_spread(&history(60, false)), Spread::default());
    }

    #[test]
    fn test_local_only_fusion() {
        let history = history(30, true);
        let days = fuse(&history, &local(3), None, 3);

        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(days[2].date, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
        for day in &days {
            assert_eq!(day.provenance.data_source, FusionSource::LocalOnly);
            assert_eq!(day.provenance.weights, BlendWeights::LOCAL_ONLY);
            assert_eq!(day.precipitation_mm, 0.0);
            assert_eq!(day.tmax, 15.0);
            assert_eq!(day.tmin, 7.0);
            assert_eq!(day.wind_speed_ms, 2.0);
        }
    }

    #[test]
    fn test_external_fusion_blends_and_clamps() {
        let history = history(30, false);
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let external = vec![
            ExternalDay {
                date: start,
                temperature_c: 20.0,
                tmax: Some(26.0),
                tmin: Some(14.0),
                precipitation_mm: Some(12.0),
                humidity: Some(80.0),
                wind_speed_ms: Some(5.0),
            },
            ExternalDay {
                date: start + Duration::days(1),
                temperature_c: 22.0,
                tmax: None,
                tmin: None,
                precipitation_mm: None,
                humidity: None,
                wind_speed_ms: None,
            },
        ];
        let days = fuse(&history, &local(4), Some(&external), 4);

        assert_eq!(days.len(), 4);
        let first = &days[0];
        assert_eq!(first.date, start);
        assert!((first.temperature_c - 18.5).abs() < 1e-9);
        assert!((first.precipitation_mm - 10.05).abs() < 1e-9);
        assert!((first.tmax - (0.85 * 26.0 + 0.15 * 23.0)).abs() < 1e-9);
        assert_eq!(first.humidity, 80.0);
        assert_eq!(first.provenance.data_source, FusionSource::ExternalFusion);

        // missing extremes fall back to the default spread
        let second = &days[1];
        assert!((second.tmax - (second.temperature_c + DEFAULT_SPREAD)).abs() < 1e-9);

        // short coverage reuses the last day with continuing dates
        assert_eq!(days[3].date, start + Duration::days(3));
        assert_eq!(days[3].temperature_c, days[1].temperature_c);
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_local_forecast_lengths() {
        let history = history(90, true);
        let model = ModelConfig::default();
        let local = local_forecast(&history, 7, &model);
        assert_eq!(local.temperature.len(), 7);
        assert_eq!(local.precipitation.len(), 7);
        assert!(local.temperature.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sequence_model_is_averaged_with_arima() {
        let history = history(90, true);
        let model = ModelConfig::default();
        let temperature = series::to_daily(&history.dates(), &history.temperatures());

        let primary = arima::forecast_series(&temperature, 7);
        let config = SequenceConfig {
            lookback: model.lookback,
            epochs: model.sequence_epochs,
            ..SequenceConfig::default()
        };
        let secondary = sequence::sequence_forecast(&temperature, 7, &config).unwrap();

        let local = local_forecast(&history, 7, &model);
        for (i, value) in local.temperature.iter().enumerate() {
            let mean = (primary.values[i] + secondary[i]) / 2.0;
            assert!((value - mean).abs() < 1e-9, "day {i}: {value} vs {mean}");
        }

        let without = ModelConfig {
            sequence_model: false,
            ..model
        };
        assert_eq!(local_forecast(&history, 7, &without).temperature, primary.values);
    }
}
