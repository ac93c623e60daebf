//! `weatherwise` - city weather history, forecasts, risk alerts and outfit advice
//!
//! History is acquired through a chain of fallback tiers, forecasts blend a
//! local statistical model with an external forecast, and risk alerts are
//! classified per forecast day.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod history;
pub mod location_resolver;
pub mod models;
pub mod outfit;
pub mod service;
pub mod weather;

// Re-export core types for public API
pub use alerts::RiskAlertEngine;
pub use cache::BoundedCache;
pub use config::WeatherwiseConfig;
pub use error::{Result, WeatherwiseError};
pub use forecast::ForecastEngine;
pub use history::HistoricalDataProvider;
pub use location_resolver::CoordinateResolver;
pub use models::{
    AlertAssessment, Coordinate, DataSource, ExtremeDay, ForecastDay, HistoricalSeries, Observation,
    RiskLevel, RiskReason,
};
pub use outfit::OutfitRecommender;
pub use service::WeatherService;
pub use weather::{Geocoder, IpLocator, IpLookupClient, OpenMeteoClient, RetryPolicy, WeatherSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
