//! End-to-end tests of the service facade with offline collaborators
//!
//! Both the geocoder and the weather source fail, so history comes from a
//! local file and every forecast is produced by the local models.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use weatherwise::config::WeatherwiseConfig;
use weatherwise::models::FusionSource;
use weatherwise::weather::{DailyRecord, GeocodingCandidate};
use weatherwise::{
    Coordinate, DataSource, Geocoder, Result, RetryPolicy, WeatherService, WeatherSource,
    WeatherwiseError,
};

struct Offline;

#[async_trait]
impl Geocoder for Offline {
    async fn search(&self, _name: &str) -> Result<Vec<GeocodingCandidate>> {
        Err(WeatherwiseError::network("offline"))
    }

    async fn reverse(&self, _coordinate: Coordinate) -> Result<Vec<GeocodingCandidate>> {
        Err(WeatherwiseError::network("offline"))
    }
}

#[async_trait]
impl WeatherSource for Offline {
    async fn recent_daily(&self, _c: Coordinate, _past_days: u32) -> Result<Vec<DailyRecord>> {
        Err(WeatherwiseError::network("offline"))
    }

    async fn archive_daily(
        &self,
        _c: Coordinate,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<DailyRecord>> {
        Err(WeatherwiseError::network("offline"))
    }

    async fn forecast_daily(&self, _c: Coordinate, _days: u32) -> Result<Vec<DailyRecord>> {
        Err(WeatherwiseError::network("offline"))
    }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// 90 days warming from -5 to 30 with only date and temperature columns
fn temperature_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,temp").unwrap();
    for i in 0..90 {
        let temp = -5.0 + 35.0 * f64::from(i) / 89.0;
        let date = start() + Duration::days(i64::from(i));
        writeln!(file, "{},{temp:.2}", date.format("%Y-%m-%d")).unwrap();
    }
    file
}

fn service(file: &NamedTempFile) -> WeatherService {
    let mut config = WeatherwiseConfig::default();
    config.data.csv_path = Some(file.path().to_path_buf());
    config.retry = RetryPolicy::none();
    config.model.sequence_model = false;
    let offline = Arc::new(Offline);
    WeatherService::with_clients(&config, offline.clone(), offline)
}

#[tokio::test]
async fn test_file_history_fills_missing_columns() {
    let file = temperature_file();
    let service = service(&file);

    assert_eq!(service.data_source("北京").await, None);
    let response = service.history("北京", 30).await.unwrap();

    assert_eq!(response.data_source, DataSource::File);
    assert_eq!(response.history.len(), 30);
    assert_eq!(response.history.last().unwrap().date, start() + Duration::days(89));
    for row in &response.history {
        assert_eq!(row.precipitation_mm, 0.0);
        assert_eq!(row.humidity, 60.0);
        assert_eq!(row.wind_speed_ms, 3.0);
    }
    assert!(response.history.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(service.data_source("北京").await, Some(DataSource::File));
}

#[tokio::test]
async fn test_history_window_is_validated() {
    let file = temperature_file();
    let service = service(&file);
    assert!(matches!(
        service.history("北京", 5).await,
        Err(WeatherwiseError::Validation { .. })
    ));
    assert!(service.history("北京", 91).await.is_err());
}

#[tokio::test]
async fn test_local_only_week_forecast() {
    let file = temperature_file();
    let service = service(&file);

    let response = service.forecast("北京", 7).await.unwrap();
    assert_eq!(response.days, 7);
    assert_eq!(response.forecast.len(), 7);
    assert_eq!(response.data_source, DataSource::File);

    let last = start() + Duration::days(89);
    for (i, day) in response.forecast.iter().enumerate() {
        assert_eq!(day.date, last + Duration::days(i as i64 + 1));
        assert_eq!(day.provenance.data_source, FusionSource::LocalOnly);
        // no tmin/tmax in the file, so the default spread applies
        assert!((day.tmax - day.temperature_c - 4.5).abs() < 1e-9);
        assert!((day.temperature_c - day.tmin - 4.5).abs() < 1e-9);
        assert!(day.precipitation_mm >= 0.0);
    }
}

#[tokio::test]
async fn test_forecast_days_are_validated() {
    let file = temperature_file();
    let service = service(&file);
    assert!(service.forecast("北京", 0).await.is_err());
    assert!(service.forecast("北京", 15).await.is_err());
    assert!(service.recommend("北京", 8).await.is_err());
}

#[tokio::test]
async fn test_alerts_cover_every_day() {
    let file = temperature_file();
    let service = service(&file);

    let response = service.alerts("北京", 10).await.unwrap();
    assert_eq!(response.alerts.len(), 10);
    for alert in &response.alerts {
        assert!(!alert.is_high() || !alert.reasons.is_empty());
        assert!(alert.baseline_temp.is_finite());
    }

    let summary = service.alerts_summary("北京", 10).await.unwrap();
    assert_eq!(summary.data_source, DataSource::File);
    assert!(summary.extremes.len() <= 10);
}

#[tokio::test]
async fn test_recommend_first_day() {
    let file = temperature_file();
    let service = service(&file);

    let response = service.recommend("北京", 3).await.unwrap();
    assert_eq!(response.for_date, start() + Duration::days(90));
    assert!(response.recommendations.len() >= 3);
}

#[tokio::test]
async fn test_refresh_and_locate() {
    let file = temperature_file();
    let service = service(&file);

    let refreshed = service.refresh("上海").await;
    assert!(refreshed.refreshed);
    assert_eq!(refreshed.data_source, DataSource::File);

    let located = service.locate("上海").await;
    assert_eq!(located.coordinate, Coordinate::new(31.2304, 121.4737));
    assert_eq!(located.nearest_city, "上海");
}

#[tokio::test]
async fn test_unreadable_file_falls_back_to_synthetic() {
    let mut config = WeatherwiseConfig::default();
    config.data.csv_path = None;
    config.data.synthetic_seed = Some(3);
    config.retry = RetryPolicy::none();
    config.model.sequence_model = false;
    let offline = Arc::new(Offline);
    let service = WeatherService::with_clients(&config, offline.clone(), offline);

    let response = service.history("北京", 90).await.unwrap();
    assert_eq!(response.data_source, DataSource::Synthetic);
    assert_eq!(response.history.len(), 90);
}
