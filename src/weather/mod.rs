//! Remote weather and geocoding services
//!
//! The pipeline talks to the outside world only through the [`Geocoder`],
//! [`WeatherSource`] and [`IpLocator`] traits so tests can substitute
//! in-memory fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Coordinate;

pub mod ip_lookup;
pub mod open_meteo;
pub mod retry;

pub use ip_lookup::IpLookupClient;
pub use open_meteo::OpenMeteoClient;
pub use retry::RetryPolicy;

/// One daily row as reported by a weather service, before cleaning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub precipitation_mm: Option<f64>,
    /// Daily maximum wind in m/s
    pub wind_speed_ms: Option<f64>,
    pub humidity: Option<f64>,
}

impl DailyRecord {
    /// Daily mean as the midpoint of max and min, when both are reported
    #[must_use]
    pub fn mean_temperature(&self) -> Option<f64> {
        match (self.tmax, self.tmin) {
            (Some(max), Some(min)) => Some((max + min) / 2.0),
            _ => None,
        }
    }
}

/// A place returned by a geocoding lookup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct GeocodingCandidate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country_code: Option<String>,
    /// Province or state
    pub admin1: Option<String>,
    /// GeoNames feature code such as `PPLC` or `PPLA2`
    pub feature_code: Option<String>,
    pub population: Option<u64>,
}

impl GeocodingCandidate {
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Approximate position of a public IP address
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct IpLocation {
    /// City name as the lookup service spells it
    pub city: Option<String>,
    pub coordinate: Option<Coordinate>,
}

impl IpLocation {
    /// `None` when the answer has neither a city nor a valid coordinate.
    #[must_use]
    pub fn from_parts(
        city: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Option<Self> {
        let city = city
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let coordinate = match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid),
            _ => None,
        };
        (city.is_some() || coordinate.is_some()).then_some(Self { city, coordinate })
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Forward lookup of a place name
    async fn search(&self, name: &str) -> Result<Vec<GeocodingCandidate>>;

    /// Places near a coordinate
    async fn reverse(&self, coordinate: Coordinate) -> Result<Vec<GeocodingCandidate>>;
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Observed daily rows for the last `past_days` days
    async fn recent_daily(&self, coordinate: Coordinate, past_days: u32)
    -> Result<Vec<DailyRecord>>;

    /// Reanalysis daily rows for an inclusive date range
    async fn archive_daily(
        &self,
        coordinate: Coordinate,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>>;

    /// Forecast daily rows starting today
    async fn forecast_daily(&self, coordinate: Coordinate, days: u32) -> Result<Vec<DailyRecord>>;
}

#[async_trait]
pub trait IpLocator: Send + Sync {
    /// Where the caller's public address appears to be
    async fn locate(&self) -> Result<IpLocation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_temperature_needs_both_extremes() {
        let mut record = DailyRecord {
            tmax: Some(30.0),
            tmin: Some(20.0),
            ..DailyRecord::default()
        };
        assert_eq!(record.mean_temperature(), Some(25.0));

        record.tmin = None;
        assert_eq!(record.mean_temperature(), None);
    }

    #[test]
    fn test_ip_location_needs_city_or_coordinate() {
        assert_eq!(IpLocation::from_parts(None, None, None), None);
        assert_eq!(IpLocation::from_parts(Some("  ".into()), Some(95.0), Some(10.0)), None);

        let only_city = IpLocation::from_parts(Some(" Nanyang ".into()), None, Some(112.5)).unwrap();
        assert_eq!(only_city.city.as_deref(), Some("Nanyang"));
        assert_eq!(only_city.coordinate, None);

        let only_coordinate = IpLocation::from_parts(None, Some(32.99), Some(112.53)).unwrap();
        assert_eq!(only_coordinate.coordinate, Some(Coordinate::new(32.99, 112.53)));
    }
}
