//! Per-day weather risk assessment
//!
//! A random forest is trained on the history with rule-derived labels and
//! then classifies every forecast day. Reasons shown to users come from a
//! separate, stricter set of thresholds so that a label and its explanation
//! can disagree: a day can be classified `high` with only the composite
//! reason attached.

pub mod forest;
pub mod trend;

use tracing::{debug, instrument, warn};

use crate::config::ModelConfig;
use crate::history::clean::{
    DEFAULT_HUMIDITY, DEFAULT_PRECIPITATION_MM, DEFAULT_TEMPERATURE_C, DEFAULT_WIND_SPEED_MS,
};
use crate::models::{AlertAssessment, ExtremeDay, ForecastDay, HistoricalSeries, Observation, RiskLevel, RiskReason};
use forest::{FeatureRow, ForestParams, RandomForest};
use trend::LinearTrend;

// Thresholds for synthetic training labels
pub const LABEL_COLD_C: f64 = 0.0;
pub const LABEL_HEAT_C: f64 = 35.0;
pub const LABEL_RAIN_MM: f64 = 10.0;
pub const LABEL_WIND_MS: f64 = 8.0;

// Thresholds for user-facing reasons
pub const REASON_COLD_C: f64 = -5.0;
pub const REASON_HEAT_C: f64 = 35.0;
pub const REASON_RAIN_MM: f64 = 10.0;
pub const REASON_WIND_MS: f64 = 8.0;

// Extremes summary cut-offs
pub const EXTREME_TMAX_C: f64 = 35.0;
pub const EXTREME_TMIN_C: f64 = -5.0;
pub const EXTREME_PRECIP_MM: f64 = 20.0;

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() { value } else { default }
}

/// Training row for one historical observation
#[must_use]
pub fn feature_row(observation: &Observation) -> FeatureRow {
    [
        finite_or(observation.temperature_c, DEFAULT_TEMPERATURE_C),
        finite_or(observation.precipitation_mm, DEFAULT_PRECIPITATION_MM),
        finite_or(observation.wind_speed_ms, DEFAULT_WIND_SPEED_MS),
        finite_or(observation.humidity, DEFAULT_HUMIDITY),
    ]
}

/// Rule-derived label used only for training
#[must_use]
pub fn synthetic_label(row: &FeatureRow) -> bool {
    let [temperature, precipitation, wind, _] = *row;
    temperature < LABEL_COLD_C
        || temperature > LABEL_HEAT_C
        || precipitation > LABEL_RAIN_MM
        || wind > LABEL_WIND_MS
}

/// Reasons for a day given its values and classified level.
///
/// A `high` day with no threshold crossed gets [`RiskReason::CompositeRisk`].
#[must_use]
pub fn reasons_for(row: &FeatureRow, level: RiskLevel) -> Vec<RiskReason> {
    let [temperature, precipitation, wind, _] = *row;
    let mut reasons = Vec::new();
    if temperature < REASON_COLD_C {
        reasons.push(RiskReason::ExtremeCold);
    }
    if temperature > REASON_HEAT_C {
        reasons.push(RiskReason::ExtremeHeat);
    }
    if precipitation > REASON_RAIN_MM {
        reasons.push(RiskReason::HeavyRain);
    }
    if wind > REASON_WIND_MS {
        reasons.push(RiskReason::HighWind);
    }
    if reasons.is_empty() && level == RiskLevel::High {
        reasons.push(RiskReason::CompositeRisk);
    }
    reasons
}

/// Classifies forecast days against a model trained on the history
#[derive(Debug, Clone)]
pub struct RiskAlertEngine {
    params: ForestParams,
}

impl RiskAlertEngine {
    #[must_use]
    pub fn new(model: &ModelConfig) -> Self {
        Self {
            params: ForestParams {
                trees: model.forest_trees,
                max_depth: model.forest_max_depth,
                seed: model.forest_seed,
                ..ForestParams::default()
            },
        }
    }

    /// One assessment per forecast day, in the same order.
    ///
    /// Without usable history every day is assessed `low` with its own
    /// temperature as baseline.
    #[instrument(skip_all, fields(history = history.len(), days = forecast.len()))]
    pub fn assess(&self, history: &HistoricalSeries, forecast: &[ForecastDay]) -> Vec<AlertAssessment> {
        let rows: Vec<FeatureRow> = history.observations().iter().map(feature_row).collect();
        let labels: Vec<bool> = rows.iter().map(synthetic_label).collect();

        let forest = match RandomForest::fit(&rows, &labels, self.params) {
            Ok(forest) => forest,
            Err(e) => {
                warn!(error = %e, "risk model unavailable, returning neutral assessments");
                return forecast.iter().map(neutral).collect();
            }
        };
        let trend = LinearTrend::fit(
            history
                .observations()
                .iter()
                .map(|o| (o.date, o.temperature_c)),
        )
        .ok();
        debug!(
            positives = labels.iter().filter(|&&l| l).count(),
            trees = forest.len(),
            "risk model trained"
        );

        forecast
            .iter()
            .map(|day| {
                let baseline_temp = trend
                    .map(|t| t.predict(day.date))
                    .filter(|b| b.is_finite())
                    .unwrap_or(day.temperature_c);
                let row = [
                    finite_or(day.temperature_c, baseline_temp),
                    finite_or(day.precipitation_mm, DEFAULT_PRECIPITATION_MM),
                    finite_or(day.wind_speed_ms, DEFAULT_WIND_SPEED_MS),
                    finite_or(day.humidity, DEFAULT_HUMIDITY),
                ];
                let level = if forest.predict(&row) {
                    RiskLevel::High
                } else {
                    RiskLevel::Low
                };
                AlertAssessment {
                    date: day.date,
                    level,
                    baseline_temp,
                    reasons: reasons_for(&row, level),
                }
            })
            .collect()
    }
}

fn neutral(day: &ForecastDay) -> AlertAssessment {
    AlertAssessment {
        date: day.date,
        level: RiskLevel::Low,
        baseline_temp: day.temperature_c,
        reasons: Vec::new(),
    }
}

/// Days worth calling out: high risk, or beyond the extreme cut-offs.
#[must_use]
pub fn summarize_extremes(forecast: &[ForecastDay], assessments: &[AlertAssessment]) -> Vec<ExtremeDay> {
    forecast
        .iter()
        .zip(assessments)
        .filter(|(day, assessment)| {
            assessment.is_high()
                || day.tmax >= EXTREME_TMAX_C
                || day.tmin <= EXTREME_TMIN_C
                || day.precipitation_mm >= EXTREME_PRECIP_MM
        })
        .map(|(day, assessment)| ExtremeDay {
            date: day.date,
            level: assessment.level,
            temperature_c: day.temperature_c,
            tmax: day.tmax,
            tmin: day.tmin,
            precipitation_mm: day.precipitation_mm,
            wind_speed_ms: day.wind_speed_ms,
            reasons: assessment.reasons.clone(),
        })
        .collect()
}
