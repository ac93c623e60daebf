//! Data models for the weather pipeline
//!
//! This module contains the core domain models organized by concern:
//! - Location: Geographic coordinates
//! - Observation: Cleaned daily history and its provenance tier
//! - Forecast: Forecast days and blending provenance
//! - Alert: Risk levels, reasons and extreme-day summaries

pub mod alert;
pub mod forecast;
pub mod location;
pub mod observation;

// Re-export all public types for convenient access
pub use alert::{AlertAssessment, ExtremeDay, RiskLevel, RiskReason};
pub use forecast::{BlendWeights, ForecastDay, FusionSource, Provenance};
pub use location::Coordinate;
pub use observation::{DataSource, HistoricalSeries, Observation};
