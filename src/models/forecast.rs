//! Forecast day model and blending provenance

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether an external forecast contributed to a day
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionSource {
    ExternalFusion,
    LocalOnly,
}

/// Weights applied when blending external and local estimates
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub external: f64,
    pub local: f64,
}

impl BlendWeights {
    pub const EXTERNAL_FUSION: Self = Self {
        external: 0.85,
        local: 0.15,
    };
    pub const LOCAL_ONLY: Self = Self {
        external: 0.0,
        local: 1.0,
    };

    #[must_use]
    pub fn blend(&self, external: f64, local: f64) -> f64 {
        self.external * external + self.local * local
    }
}

/// Component values that went into a forecast day
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Provenance {
    pub external_temp: Option<f64>,
    pub external_precip: Option<f64>,
    pub local_temp: f64,
    pub local_precip: f64,
    pub weights: BlendWeights,
    pub data_source: FusionSource,
}

/// One forecast day. `tmin <= temperature_c <= tmax` and precipitation is never negative.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub temperature_c: f64,
    pub tmax: f64,
    pub tmin: f64,
    pub precipitation_mm: f64,
    pub humidity: f64,
    pub wind_speed_ms: f64,
    pub provenance: Provenance,
}

impl ForecastDay {
    #[must_use]
    pub fn is_fused(&self) -> bool {
        self.provenance.data_source == FusionSource::ExternalFusion
    }
}
