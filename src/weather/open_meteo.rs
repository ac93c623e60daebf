//! Open-Meteo forecast, archive and geocoding client

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{DailyRecord, GeocodingCandidate, Geocoder, WeatherSource};
use crate::config::WeatherConfig;
use crate::error::{Result, WeatherwiseError};
use crate::models::Coordinate;

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,windspeed_10m_max,relative_humidity_2m_mean";
const KMH_PER_MS: f64 = 3.6;
const GEOCODING_RESULTS: u32 = 10;
const GEOCODING_LANGUAGE: &str = "zh";
/// Upper bound the forecast endpoint accepts for `forecast_days`
pub const MAX_FORECAST_DAYS: u32 = 14;

/// Async client for the Open-Meteo APIs
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    config: WeatherConfig,
}

impl OpenMeteoClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("weatherwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WeatherwiseError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn daily_query(&self, coordinate: Coordinate) -> String {
        format!(
            "latitude={}&longitude={}&daily={}&timezone={}",
            coordinate.latitude,
            coordinate.longitude,
            DAILY_FIELDS,
            urlencoding::encode(&self.config.timezone)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, timeout_seconds: u64) -> Result<T> {
        debug!(url, "requesting");
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(timeout_seconds))
            .send()
            .await?;

        let response = check_status(response, "Open-Meteo").await?;
        response
            .json::<T>()
            .await
            .map_err(|e| WeatherwiseError::parse(format!("Failed to parse Open-Meteo response: {e}")))
    }

    async fn get_daily(&self, url: &str, timeout_seconds: u64) -> Result<Vec<DailyRecord>> {
        let response: openmeteo::DailyResponse = self.get_json(url, timeout_seconds).await?;
        let records = response.into_records();
        debug!(rows = records.len(), "daily rows received");
        Ok(records)
    }
}

/// Pass successful responses through, turn anything else into an HTTP error
pub(super) async fn check_status(response: Response, service: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(WeatherwiseError::http(
        status.as_u16(),
        format!("{service} returned {status}: {body}"),
    ))
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    #[instrument(skip(self))]
    async fn recent_daily(
        &self,
        coordinate: Coordinate,
        past_days: u32,
    ) -> Result<Vec<DailyRecord>> {
        // forecast_days=0 keeps the window to observed days only
        let url = format!(
            "{}/forecast?{}&past_days={}&forecast_days=0",
            self.config.forecast_base_url,
            self.daily_query(coordinate),
            past_days
        );
        self.get_daily(&url, self.config.data_timeout_seconds).await
    }

    #[instrument(skip(self))]
    async fn archive_daily(
        &self,
        coordinate: Coordinate,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>> {
        if start > end {
            return Err(WeatherwiseError::validation(format!(
                "archive range starts after it ends: {start} > {end}"
            )));
        }
        let url = format!(
            "{}/era5?{}&start_date={}&end_date={}",
            self.config.archive_base_url,
            self.daily_query(coordinate),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        self.get_daily(&url, self.config.data_timeout_seconds).await
    }

    #[instrument(skip(self))]
    async fn forecast_daily(&self, coordinate: Coordinate, days: u32) -> Result<Vec<DailyRecord>> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let url = format!(
            "{}/forecast?{}&forecast_days={}",
            self.config.forecast_base_url,
            self.daily_query(coordinate),
            days
        );
        self.get_daily(&url, self.config.forecast_timeout_seconds).await
    }
}

#[async_trait]
impl Geocoder for OpenMeteoClient {
    #[instrument(skip(self))]
    async fn search(&self, name: &str) -> Result<Vec<GeocodingCandidate>> {
        let url = format!(
            "{}/search?name={}&count={}&language={}&format=json",
            self.config.geocoding_base_url,
            urlencoding::encode(name),
            GEOCODING_RESULTS,
            GEOCODING_LANGUAGE
        );
        let response: openmeteo::GeocodingResponse = self
            .get_json(&url, self.config.geocoding_timeout_seconds)
            .await?;
        Ok(response.into_candidates())
    }

    #[instrument(skip(self))]
    async fn reverse(&self, coordinate: Coordinate) -> Result<Vec<GeocodingCandidate>> {
        let url = format!(
            "{}/reverse?latitude={}&longitude={}&count={}&language={}&format=json",
            self.config.geocoding_base_url,
            coordinate.latitude,
            coordinate.longitude,
            GEOCODING_RESULTS,
            GEOCODING_LANGUAGE
        );
        let response: openmeteo::GeocodingResponse = self
            .get_json(&url, self.config.geocoding_timeout_seconds)
            .await?;
        Ok(response.into_candidates())
    }
}

/// `OpenMeteo` API response structures and conversion utilities
mod openmeteo {
    use super::{DailyRecord, GeocodingCandidate, KMH_PER_MS};
    use chrono::NaiveDate;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct DailyResponse {
        pub daily: Option<DailyData>,
    }

    /// Column-oriented daily block; every column is aligned with `time`
    #[derive(Debug, Deserialize)]
    pub struct DailyData {
        pub time: Vec<String>,
        #[serde(rename = "temperature_2m_max", default)]
        pub temperature_max: Vec<Option<f64>>,
        #[serde(rename = "temperature_2m_min", default)]
        pub temperature_min: Vec<Option<f64>>,
        #[serde(rename = "precipitation_sum", default)]
        pub precipitation: Vec<Option<f64>>,
        /// km/h
        #[serde(rename = "windspeed_10m_max", default)]
        pub wind_speed_max: Vec<Option<f64>>,
        #[serde(rename = "relative_humidity_2m_mean", default)]
        pub humidity_mean: Vec<Option<f64>>,
    }

    fn at(column: &[Option<f64>], index: usize) -> Option<f64> {
        column.get(index).copied().flatten().filter(|v| v.is_finite())
    }

    impl DailyResponse {
        /// Rows with unparseable dates are dropped.
        pub fn into_records(self) -> Vec<DailyRecord> {
            let Some(daily) = self.daily else {
                return Vec::new();
            };
            daily
                .time
                .iter()
                .enumerate()
                .filter_map(|(i, day)| {
                    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
                    Some(DailyRecord {
                        date,
                        tmax: at(&daily.temperature_max, i),
                        tmin: at(&daily.temperature_min, i),
                        precipitation_mm: at(&daily.precipitation, i),
                        wind_speed_ms: at(&daily.wind_speed_max, i).map(|kmh| kmh / KMH_PER_MS),
                        humidity: at(&daily.humidity_mean, i),
                    })
                })
                .collect()
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct GeocodingResponse {
        pub results: Option<Vec<GeocodingResult>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct GeocodingResult {
        pub name: String,
        pub latitude: f64,
        pub longitude: f64,
        pub country_code: Option<String>,
        pub admin1: Option<String>,
        pub feature_code: Option<String>,
        pub population: Option<u64>,
    }

    impl From<GeocodingResult> for GeocodingCandidate {
        fn from(result: GeocodingResult) -> Self {
            Self {
                name: result.name,
                latitude: result.latitude,
                longitude: result.longitude,
                country_code: result.country_code,
                admin1: result.admin1,
                feature_code: result.feature_code,
                population: result.population,
            }
        }
    }

    impl GeocodingResponse {
        pub fn into_candidates(self) -> Vec<GeocodingCandidate> {
            self.results
                .unwrap_or_default()
                .into_iter()
                .map(GeocodingCandidate::from)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::openmeteo::{DailyResponse, GeocodingResponse};

    #[test]
    fn test_daily_response_conversion() {
        let json = r#"{
            "daily": {
                "time": ["2024-07-01", "not-a-date", "2024-07-03"],
                "temperature_2m_max": [32.0, 30.0, null],
                "temperature_2m_min": [24.0, 22.0, 21.0],
                "precipitation_sum": [0.0, 1.5, 12.0],
                "windspeed_10m_max": [36.0, 18.0, 7.2]
            }
        }"#;
        let response: DailyResponse = serde_json::from_str(json).unwrap();
        let records = response.into_records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mean_temperature(), Some(28.0));
        assert!((records[0].wind_speed_ms.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(records[0].humidity, None);
        assert_eq!(records[1].tmax, None);
        assert_eq!(records[1].precipitation_mm, Some(12.0));
    }

    #[test]
    fn test_missing_daily_block_yields_no_rows() {
        let response: DailyResponse = serde_json::from_str("{}").unwrap();
        assert!(response.into_records().is_empty());
    }

    #[test]
    fn test_geocoding_response_without_results() {
        let response: GeocodingResponse = serde_json::from_str(r#"{"generationtime_ms": 0.5}"#).unwrap();
        assert!(response.into_candidates().is_empty());
    }
}
