//! Local tabular fallback
//!
//! Reads a CSV file with loosely named columns. A date column and a
//! temperature column are required; every other column is optional.

use csv::StringRecord;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::clean::{RawRow, clean, parse_date, parse_number};
use crate::error::{Result, WeatherwiseError};
use crate::models::{DataSource, HistoricalSeries};

const DATE_ALIASES: &[&str] = &["date", "ds", "time", "day"];
const TEMPERATURE_ALIASES: &[&str] = &["temperature_c", "temp", "temperature"];
const PRECIPITATION_ALIASES: &[&str] = &["precipitation_mm", "precipitation", "rain", "precip"];
const HUMIDITY_ALIASES: &[&str] = &["humidity", "hum"];
const WIND_ALIASES: &[&str] = &["wind_speed_ms", "wind", "wind_speed"];
const TMIN_ALIASES: &[&str] = &["tmin", "temp_min", "temperature_min"];
const TMAX_ALIASES: &[&str] = &["tmax", "temp_max", "temperature_max"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq)]
struct ColumnMap {
    date: usize,
    temperature: usize,
    tmin: Option<usize>,
    tmax: Option<usize>,
    precipitation: Option<usize>,
    humidity: Option<usize>,
    wind: Option<usize>,
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    aliases
        .iter()
        .find_map(|alias| normalized.iter().position(|h| h == alias))
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let date = find_column(headers, DATE_ALIASES)
            .ok_or_else(|| WeatherwiseError::parse("no date column in file"))?;
        let temperature = find_column(headers, TEMPERATURE_ALIASES)
            .ok_or_else(|| WeatherwiseError::parse("no temperature column in file"))?;

        Ok(Self {
            date,
            temperature,
            tmin: find_column(headers, TMIN_ALIASES),
            tmax: find_column(headers, TMAX_ALIASES),
            precipitation: find_column(headers, PRECIPITATION_ALIASES),
            humidity: find_column(headers, HUMIDITY_ALIASES),
            wind: find_column(headers, WIND_ALIASES),
        })
    }

    fn row(&self, record: &StringRecord) -> RawRow {
        let number = |index: Option<usize>| index.and_then(|i| record.get(i)).and_then(parse_number);
        RawRow {
            date: record.get(self.date).and_then(parse_date),
            temperature_c: number(Some(self.temperature)),
            tmin: number(self.tmin),
            tmax: number(self.tmax),
            precipitation_mm: number(self.precipitation),
            humidity: number(self.humidity),
            wind_speed_ms: number(self.wind),
        }
    }
}

/// Parse CSV content into a cleaned series.
pub fn parse_series<R: Read>(reader: R) -> Result<HistoricalSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::from_headers(reader.headers()?)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(columns.row(&record?));
    }
    debug!(rows = rows.len(), "rows read from file");

    clean(rows, DataSource::File)
}

/// Read and clean the file at `path`.
pub fn read_series(path: &Path) -> Result<HistoricalSeries> {
    let file = std::fs::File::open(path)?;
    parse_series(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let content = "date,temp\n2024-01-01,1.5\n2024-01-02,2.5\n2024-01-03,\n";
        let series = parse_series(content.as_bytes()).unwrap();

        assert_eq!(series.source(), DataSource::File);
        assert_eq!(series.len(), 3);
        let last = &series.observations()[2];
        assert_eq!(last.temperature_c, 2.0);
        assert_eq!(last.precipitation_mm, 0.0);
        assert_eq!(last.humidity, 60.0);
        assert_eq!(last.wind_speed_ms, 3.0);
        assert_eq!(last.tmin, None);
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let content = "DS, Temperature ,Rain,HUM,Wind,TMin,TMax\n\
                       2024-05-02,20,1.0,55,4.0,15,25\n\
                       2024-05-01,18,0.0,65,2.0,13,23\n";
        let series = parse_series(content.as_bytes()).unwrap();
        let first = &series.observations()[0];

        assert_eq!(first.temperature_c, 18.0);
        assert_eq!(first.humidity, 65.0);
        assert_eq!(first.tmax, Some(23.0));
        assert_eq!(series.observations()[1].precipitation_mm, 1.0);
    }

    #[test]
    fn test_missing_required_column_is_rejected() {
        let result = parse_series("day,humidity\n2024-01-01,50\n".as_bytes());
        assert!(matches!(result, Err(WeatherwiseError::Parse { .. })));
    }

    #[test]
    fn test_read_series_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,temperature_c,precipitation_mm").unwrap();
        writeln!(file, "2024-02-01,3.0,0.5").unwrap();
        writeln!(file, "2024-02-02,4.0,abc").unwrap();

        let series = read_series(file.path()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations()[1].precipitation_mm, 0.5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_series(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(WeatherwiseError::Io { .. })));
    }
}
