//! Daily observation rows and the cleaned historical series

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One cleaned daily weather row
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    /// Daily mean temperature in Celsius
    pub temperature_c: f64,
    /// Daily minimum, absent when the source never reported one
    pub tmin: Option<f64>,
    /// Daily maximum, absent when the source never reported one
    pub tmax: Option<f64>,
    /// Precipitation sum in mm
    pub precipitation_mm: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Wind speed in m/s
    pub wind_speed_ms: f64,
}

/// Which acquisition tier produced a series
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    RecentApi,
    ArchiveApi,
    File,
    Synthetic,
}

impl DataSource {
    /// Tiers in the order they are attempted
    pub const FALLBACK_ORDER: [DataSource; 4] = [
        DataSource::RecentApi,
        DataSource::ArchiveApi,
        DataSource::File,
        DataSource::Synthetic,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RecentApi => "recent-api",
            Self::ArchiveApi => "archive-api",
            Self::File => "file",
            Self::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cleaned daily history: dates strictly increasing, every numeric field finite.
///
/// The only way to build one is [`HistoricalSeries::new`], which sorts and
/// deduplicates, so downstream stages can rely on the ordering.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct HistoricalSeries {
    source: DataSource,
    observations: Vec<Observation>,
}

impl HistoricalSeries {
    /// Sorts by date and keeps the last row for duplicated dates.
    #[must_use]
    pub fn new(source: DataSource, mut observations: Vec<Observation>) -> Self {
        // stable sort keeps input order among equal dates, so the later row wins below
        observations.sort_by_key(|o| o.date);
        let mut deduped: Vec<Observation> = Vec::with_capacity(observations.len());
        for obs in observations {
            match deduped.last_mut() {
                Some(last) if last.date == obs.date => *last = obs,
                _ => deduped.push(obs),
            }
        }
        Self {
            source,
            observations: deduped,
        }
    }

    #[must_use]
    pub const fn source(&self) -> DataSource {
        self.source
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// The last `n` observations (or all of them when shorter)
    #[must_use]
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    #[must_use]
    pub fn temperatures(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.temperature_c).collect()
    }

    #[must_use]
    pub fn precipitation(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.precipitation_mm).collect()
    }

    /// Mean of `field` over the last `n` rows, `None` for an empty series
    pub fn trailing_mean<F>(&self, n: usize, field: F) -> Option<f64>
    where
        F: Fn(&Observation) -> f64,
    {
        let tail = self.tail(n);
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().map(field).sum::<f64>() / tail.len() as f64)
    }
}
