//! Request-level facade over the pipeline
//!
//! Each operation loads (or reuses) the city's history, runs the stages it
//! needs and returns a plain serializable record tagged with the historical
//! tier that fed it. Models are trained per request; only the history and
//! coordinates are cached.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::alerts::{self, RiskAlertEngine};
use crate::config::WeatherwiseConfig;
use crate::error::{Result, WeatherwiseError};
use crate::forecast::{ForecastEngine, MAX_FORECAST_DAYS};
use crate::history::HistoricalDataProvider;
use crate::location_resolver::CoordinateResolver;
use crate::models::{AlertAssessment, Coordinate, DataSource, ExtremeDay, ForecastDay, HistoricalSeries, Observation};
use crate::outfit::OutfitRecommender;
use crate::weather::{Geocoder, IpLocator, IpLookupClient, OpenMeteoClient, WeatherSource};

pub const MIN_HISTORY_DAYS: usize = 7;
pub const MAX_HISTORY_DAYS: usize = 90;
pub const MAX_RECOMMEND_DAYS: usize = 7;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub city: String,
    pub data_source: DataSource,
    pub history: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub city: String,
    pub days: usize,
    pub forecast: Vec<ForecastDay>,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub city: String,
    pub alerts: Vec<AlertAssessment>,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub city: String,
    pub extremes: Vec<ExtremeDay>,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub city: String,
    pub for_date: NaiveDate,
    pub recommendations: Vec<String>,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocateResponse {
    pub city: String,
    pub coordinate: Coordinate,
    pub nearest_city: String,
    /// City name reported by IP geolocation, when the caller was located by address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_city: Option<String>,
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(WeatherwiseError::validation(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

/// Owns every pipeline stage
pub struct WeatherService {
    resolver: Arc<CoordinateResolver>,
    provider: HistoricalDataProvider,
    forecaster: ForecastEngine,
    risk: RiskAlertEngine,
    outfit: OutfitRecommender,
    ip_locator: Option<Arc<dyn IpLocator>>,
}

impl WeatherService {
    /// Service backed by the Open-Meteo client and the IP geolocation chain
    pub fn new(config: &WeatherwiseConfig) -> Result<Self> {
        let client = Arc::new(OpenMeteoClient::new(&config.weather)?);
        let ip_locator = Arc::new(IpLookupClient::new(&config.ip_lookup)?);
        Ok(Self::with_clients(config, client.clone(), client).with_ip_locator(ip_locator))
    }

    /// Service backed by caller-supplied geocoding and weather sources
    pub fn with_clients(
        config: &WeatherwiseConfig,
        geocoder: Arc<dyn Geocoder>,
        source: Arc<dyn WeatherSource>,
    ) -> Self {
        let resolver = Arc::new(CoordinateResolver::new(
            geocoder,
            config.cache.coordinate_capacity,
            config.data.default_city.clone(),
        ));
        let provider = HistoricalDataProvider::new(
            Arc::clone(&resolver),
            Arc::clone(&source),
            &config.data,
            config.cache.series_capacity,
        );
        let forecaster = ForecastEngine::new(
            Arc::clone(&resolver),
            source,
            config.retry.clone(),
            config.model.clone(),
        );
        Self {
            resolver,
            provider,
            forecaster,
            risk: RiskAlertEngine::new(&config.model),
            outfit: OutfitRecommender::new(),
            ip_locator: None,
        }
    }

    /// Locate callers by their public IP address when `locate` gets no city
    #[must_use]
    pub fn with_ip_locator(mut self, locator: Arc<dyn IpLocator>) -> Self {
        self.ip_locator = Some(locator);
        self
    }

    async fn forecast_for(&self, city: &str, days: usize) -> Result<(Arc<HistoricalSeries>, Vec<ForecastDay>)> {
        let history = self.provider.load(city).await;
        let forecast = self.forecaster.forecast(&history, days, city).await?;
        Ok((history, forecast))
    }

    /// Trailing `days` observations of the city's history
    #[instrument(skip(self))]
    pub async fn history(&self, city: &str, days: usize) -> Result<HistoryResponse> {
        check_range("days", days, MIN_HISTORY_DAYS, MAX_HISTORY_DAYS)?;
        let series = self.provider.load(city).await;
        Ok(HistoryResponse {
            city: city.to_string(),
            data_source: series.source(),
            history: series.tail(days).to_vec(),
        })
    }

    #[instrument(skip(self))]
    pub async fn forecast(&self, city: &str, days: usize) -> Result<ForecastResponse> {
        let (history, forecast) = self.forecast_for(city, days).await?;
        Ok(ForecastResponse {
            city: city.to_string(),
            days,
            forecast,
            data_source: history.source(),
        })
    }

    #[instrument(skip(self))]
    pub async fn alerts(&self, city: &str, days: usize) -> Result<AlertsResponse> {
        let (history, forecast) = self.forecast_for(city, days).await?;
        Ok(AlertsResponse {
            city: city.to_string(),
            alerts: self.risk.assess(&history, &forecast),
            data_source: history.source(),
        })
    }

    #[instrument(skip(self))]
    pub async fn alerts_summary(&self, city: &str, days: usize) -> Result<SummaryResponse> {
        let (history, forecast) = self.forecast_for(city, days).await?;
        let assessments = self.risk.assess(&history, &forecast);
        Ok(SummaryResponse {
            city: city.to_string(),
            extremes: alerts::summarize_extremes(&forecast, &assessments),
            data_source: history.source(),
        })
    }

    /// Outfit for the first forecast day
    #[instrument(skip(self))]
    pub async fn recommend(&self, city: &str, days: usize) -> Result<RecommendResponse> {
        check_range("days", days, 1, MAX_RECOMMEND_DAYS.min(MAX_FORECAST_DAYS))?;
        let (history, forecast) = self.forecast_for(city, days).await?;
        let first = forecast
            .first()
            .ok_or_else(|| WeatherwiseError::insufficient("forecast is empty"))?;
        Ok(RecommendResponse {
            city: city.to_string(),
            for_date: first.date,
            recommendations: self.outfit.recommend(
                first.temperature_c,
                first.precipitation_mm,
                first.wind_speed_ms,
                first.humidity,
            ),
            data_source: history.source(),
        })
    }

    /// Drop the cached history and acquire it again
    #[instrument(skip(self))]
    pub async fn refresh(&self, city: &str) -> RefreshResponse {
        let series = self.provider.refresh(city).await;
        info!(city, source = %series.source(), "history refreshed");
        RefreshResponse {
            refreshed: true,
            data_source: series.source(),
        }
    }

    /// Tier of the cached history, if the city has been loaded
    pub async fn data_source(&self, city: &str) -> Option<DataSource> {
        self.provider.cached_source(city).await
    }

    /// Resolved coordinate and nearest named place.
    ///
    /// A blank `city` locates the caller by IP address when an IP locator is
    /// configured, and otherwise resolves the default city.
    #[instrument(skip(self))]
    pub async fn locate(&self, city: &str) -> LocateResponse {
        let city = if city.trim().is_empty() {
            if let Some(located) = self.locate_caller().await {
                return located;
            }
            self.resolver.default_city()
        } else {
            city
        };
        let coordinate = self.resolver.resolve(city).await;
        LocateResponse {
            city: city.to_string(),
            coordinate,
            nearest_city: self.resolver.nearest_city(coordinate).await,
            detected_city: None,
        }
    }

    async fn locate_caller(&self) -> Option<LocateResponse> {
        let locator = self.ip_locator.as_ref()?;
        let location = match locator.locate().await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "IP geolocation failed, using default city");
                return None;
            }
        };
        let Some(name) = self.resolver.city_for_location(&location).await else {
            warn!(reported = ?location.city, "IP location could not be named, using default city");
            return None;
        };
        let coordinate = match location.coordinate {
            Some(coordinate) => coordinate,
            None => self.resolver.resolve(&name).await,
        };
        info!(city = %name, "caller located by IP address");
        Some(LocateResponse {
            city: name.clone(),
            coordinate,
            nearest_city: name,
            detected_city: location.city,
        })
    }
}
