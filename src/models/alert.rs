//! Risk assessment models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

/// Human-facing explanation attached to an assessment
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    ExtremeCold,
    ExtremeHeat,
    HeavyRain,
    HighWind,
    /// High risk without any single threshold crossed
    CompositeRisk,
}

impl RiskReason {
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ExtremeCold => "extreme cold",
            Self::ExtremeHeat => "extreme heat",
            Self::HeavyRain => "heavy rain",
            Self::HighWind => "high wind",
            Self::CompositeRisk => "elevated composite risk",
        }
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Per-day risk classification
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlertAssessment {
    pub date: NaiveDate,
    pub level: RiskLevel,
    /// Trend-model temperature for the date
    pub baseline_temp: f64,
    pub reasons: Vec<RiskReason>,
}

impl AlertAssessment {
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.level == RiskLevel::High
    }
}

/// A forecast day flagged as noteworthy by the extremes summary
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtremeDay {
    pub date: NaiveDate,
    pub level: RiskLevel,
    pub temperature_c: f64,
    pub tmax: f64,
    pub tmin: f64,
    pub precipitation_mm: f64,
    pub wind_speed_ms: f64,
    pub reasons: Vec<RiskReason>,
}
