//! Shared cleaning pipeline for every acquisition tier
//!
//! Raw rows carry optional values. Cleaning fills each numeric column with its
//! median (or a fixed default when the column is empty throughout), fills
//! missing dates from their neighbours, then sorts and deduplicates.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{Result, WeatherwiseError};
use crate::models::{DataSource, HistoricalSeries, Observation};
use crate::weather::DailyRecord;

pub const DEFAULT_TEMPERATURE_C: f64 = 20.0;
pub const DEFAULT_PRECIPITATION_MM: f64 = 0.0;
pub const DEFAULT_HUMIDITY: f64 = 60.0;
pub const DEFAULT_WIND_SPEED_MS: f64 = 3.0;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d.%m.%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// One acquired row before cleaning
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub date: Option<NaiveDate>,
    pub temperature_c: Option<f64>,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed_ms: Option<f64>,
}

impl RawRow {
    /// A row counts towards tier acceptance when it has a date and a temperature.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.date.is_some() && self.temperature_c.is_some()
    }
}

impl From<DailyRecord> for RawRow {
    fn from(record: DailyRecord) -> Self {
        Self {
            date: Some(record.date),
            temperature_c: record.mean_temperature(),
            tmin: record.tmin,
            tmax: record.tmax,
            precipitation_mm: record.precipitation_mm,
            humidity: record.humidity,
            wind_speed_ms: record.wind_speed_ms,
        }
    }
}

/// Parse a calendar date or a timestamp in one of the common layouts.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Coerce a text cell to a finite number
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Median of the finite values, `None` when there are none
#[must_use]
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn column_fill<F>(rows: &[RawRow], field: F) -> Option<f64>
where
    F: Fn(&RawRow) -> Option<f64>,
{
    median(rows.iter().filter_map(field))
}

/// Fill missing dates forward, then backward for a leading gap.
fn fill_dates(rows: &mut [RawRow]) -> Result<()> {
    let mut last = None;
    for row in rows.iter_mut() {
        match row.date {
            Some(date) => last = Some(date),
            None => row.date = last,
        }
    }
    let first = rows
        .iter()
        .find_map(|r| r.date)
        .ok_or_else(|| WeatherwiseError::parse("no parseable dates"))?;
    for row in rows.iter_mut().take_while(|r| r.date.is_none()) {
        row.date = Some(first);
    }
    Ok(())
}

/// Drop rows without a temperature from the end of a date-ordered window and
/// return how many were dropped.
///
/// Reanalysis data lags a few days behind, so a window ending today closes
/// with empty rows. Imputing them would flatten the series tail to the column
/// median.
pub fn drop_unobserved_tail(rows: &mut Vec<RawRow>) -> usize {
    let kept = rows
        .iter()
        .rposition(|row| row.temperature_c.is_some())
        .map_or(0, |last| last + 1);
    let dropped = rows.len() - kept;
    rows.truncate(kept);
    dropped
}

/// Clean raw rows into a [`HistoricalSeries`].
///
/// Fails when there are no rows or no row has a usable date.
pub fn clean(mut rows: Vec<RawRow>, source: DataSource) -> Result<HistoricalSeries> {
    if rows.is_empty() {
        return Err(WeatherwiseError::insufficient(format!("{source} returned no rows")));
    }

    let temperature = column_fill(&rows, |r| r.temperature_c).unwrap_or(DEFAULT_TEMPERATURE_C);
    let tmin = column_fill(&rows, |r| r.tmin);
    let tmax = column_fill(&rows, |r| r.tmax);
    let precipitation =
        column_fill(&rows, |r| r.precipitation_mm).unwrap_or(DEFAULT_PRECIPITATION_MM);
    let humidity = column_fill(&rows, |r| r.humidity).unwrap_or(DEFAULT_HUMIDITY);
    let wind = column_fill(&rows, |r| r.wind_speed_ms).unwrap_or(DEFAULT_WIND_SPEED_MS);

    fill_dates(&mut rows)?;

    let observations = rows
        .into_iter()
        .filter_map(|row| {
            Some(Observation {
                date: row.date?,
                temperature_c: row.temperature_c.unwrap_or(temperature),
                tmin: row.tmin.or(tmin),
                tmax: row.tmax.or(tmax),
                precipitation_mm: row.precipitation_mm.unwrap_or(precipitation).max(0.0),
                humidity: row.humidity.unwrap_or(humidity),
                wind_speed_ms: row.wind_speed_ms.unwrap_or(wind),
            })
        })
        .collect();

    Ok(HistoricalSeries::new(source, observations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[rstest]
    #[case("2024-03-01", Some("2024-03-01"))]
    #[case("2024/03/01", Some("2024-03-01"))]
    #[case("20240301", Some("2024-03-01"))]
    #[case("2024-03-01 12:30:00", Some("2024-03-01"))]
    #[case("2024-03-01T00:00:00+08:00", Some("2024-03-01"))]
    #[case("yesterday", None)]
    #[case("", None)]
    fn test_parse_date(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_date(raw), expected.map(date));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(vec![f64::NAN]), None);
        assert_eq!(median(Vec::new()), None);
    }

    #[test]
    fn test_numeric_gaps_take_column_median() {
        let rows = vec![
            RawRow {
                date: Some(date("2024-01-01")),
                temperature_c: Some(1.0),
                humidity: Some(50.0),
                ..RawRow::default()
            },
            RawRow {
                date: Some(date("2024-01-02")),
                temperature_c: None,
                humidity: Some(70.0),
                ..RawRow::default()
            },
            RawRow {
                date: Some(date("2024-01-03")),
                temperature_c: Some(5.0),
                humidity: None,
                ..RawRow::default()
            },
        ];
        let series = clean(rows, DataSource::File).unwrap();
        let obs = series.observations();

        assert_eq!(obs[1].temperature_c, 3.0);
        assert_eq!(obs[2].humidity, 60.0);
        // wholly missing columns get defaults or stay absent
        assert!(obs.iter().all(|o| o.wind_speed_ms == DEFAULT_WIND_SPEED_MS));
        assert!(obs.iter().all(|o| o.precipitation_mm == 0.0));
        assert!(obs.iter().all(|o| o.tmin.is_none() && o.tmax.is_none()));
    }

    #[test]
    fn test_missing_dates_are_filled_and_deduplicated() {
        let rows = vec![
            RawRow {
                date: None,
                temperature_c: Some(0.0),
                ..RawRow::default()
            },
            RawRow {
                date: Some(date("2024-01-02")),
                temperature_c: Some(2.0),
                ..RawRow::default()
            },
            RawRow {
                date: None,
                temperature_c: Some(9.0),
                ..RawRow::default()
            },
            RawRow {
                date: Some(date("2024-01-01")),
                temperature_c: Some(1.0),
                ..RawRow::default()
            },
        ];
        let series = clean(rows, DataSource::File).unwrap();

        // the leading row borrows 01-02 and is superseded; the third row
        // forward-fills 01-02 and wins as the later duplicate
        assert_eq!(series.dates(), vec![date("2024-01-01"), date("2024-01-02")]);
        assert_eq!(series.temperatures(), vec![1.0, 9.0]);
    }

    #[test]
    fn test_rows_without_any_date_fail() {
        let rows = vec![RawRow {
            temperature_c: Some(1.0),
            ..RawRow::default()
        }];
        assert!(matches!(
            clean(rows, DataSource::File),
            Err(WeatherwiseError::Parse { .. })
        ));
        assert!(clean(Vec::new(), DataSource::ArchiveApi).is_err());
    }

    #[test]
    fn test_unobserved_tail_is_dropped() {
        let row = |day: &str, temperature: Option<f64>| RawRow {
            date: Some(date(day)),
            temperature_c: temperature,
            ..RawRow::default()
        };
        let mut rows = vec![
            row("2024-01-01", Some(1.0)),
            row("2024-01-02", None),
            row("2024-01-03", Some(3.0)),
            row("2024-01-04", None),
            row("2024-01-05", None),
        ];
        assert_eq!(drop_unobserved_tail(&mut rows), 2);
        // interior gaps stay for imputation
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].temperature_c, Some(3.0));

        let mut empty = vec![row("2024-01-01", None)];
        assert_eq!(drop_unobserved_tail(&mut empty), 1);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_daily_record_conversion() {
        let row = RawRow::from(DailyRecord {
            date: date("2024-07-01"),
            tmax: Some(30.0),
            tmin: Some(22.0),
            precipitation_mm: None,
            wind_speed_ms: Some(2.0),
            humidity: None,
        });
        assert_eq!(row.temperature_c, Some(26.0));
        assert!(row.is_valid());
    }
}
