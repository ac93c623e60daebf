//! Historical data acquisition with tiered fallback
//!
//! Tiers are attempted in [`DataSource::FALLBACK_ORDER`]: the recent window
//! from the forecast service, a one-year reanalysis archive, a local CSV file
//! and finally a synthetic seasonal series. Each tier either yields a cleaned
//! series or an error that moves acquisition on to the next tier.

pub mod clean;
pub mod file;
pub mod synthetic;

use chrono::{Duration, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, instrument, warn};

use crate::cache::BoundedCache;
use crate::config::DataConfig;
use crate::error::{Result, WeatherwiseError};
use crate::location_resolver::CoordinateResolver;
use crate::models::{Coordinate, DataSource, HistoricalSeries};
use crate::weather::WeatherSource;
use clean::RawRow;

/// Days requested from the recent-window endpoint
pub const RECENT_WINDOW_DAYS: u32 = 92;
/// Valid rows the recent window needs to be accepted
pub const MIN_RECENT_ROWS: usize = 30;
/// Length of the archive request
pub const ARCHIVE_WINDOW_DAYS: i64 = 365;

/// Loads and caches per-city history
pub struct HistoricalDataProvider {
    resolver: Arc<CoordinateResolver>,
    source: Arc<dyn WeatherSource>,
    csv_path: Option<PathBuf>,
    synthetic_seed: Option<u64>,
    cache: BoundedCache<Arc<HistoricalSeries>>,
}

impl HistoricalDataProvider {
    pub fn new(
        resolver: Arc<CoordinateResolver>,
        source: Arc<dyn WeatherSource>,
        data: &DataConfig,
        capacity: u64,
    ) -> Self {
        Self {
            resolver,
            source,
            csv_path: data.csv_path.clone(),
            synthetic_seed: data.synthetic_seed,
            cache: BoundedCache::new("history", capacity),
        }
    }

    /// History for `city`, served from cache when present.
    ///
    /// Never fails: the synthetic tier is always available.
    #[instrument(skip(self))]
    pub async fn load(&self, city: &str) -> Arc<HistoricalSeries> {
        self.cache.get_or_insert_with(city, self.acquire(city)).await
    }

    /// Drop the cached series for `city` and acquire it again.
    pub async fn refresh(&self, city: &str) -> Arc<HistoricalSeries> {
        self.cache.remove(city).await;
        self.load(city).await
    }

    /// Tier of the cached series for `city`, if one is cached
    pub async fn cached_source(&self, city: &str) -> Option<DataSource> {
        self.cache.get(city).await.map(|series| series.source())
    }

    async fn acquire(&self, city: &str) -> Arc<HistoricalSeries> {
        let coordinate = self.resolver.resolve(city).await;
        let today = Utc::now().date_naive();

        for tier in DataSource::FALLBACK_ORDER {
            match self.try_tier(tier, coordinate, today).await {
                Ok(series) => {
                    info!(
                        city,
                        source = %series.source(),
                        rows = series.len(),
                        "historical data loaded"
                    );
                    return Arc::new(series);
                }
                Err(e) => warn!(city, tier = %tier, error = %e, "tier unavailable, falling back"),
            }
        }

        // unreachable while the synthetic tier is infallible
        Arc::new(synthetic::generate(today, self.synthetic_seed))
    }

    async fn try_tier(
        &self,
        tier: DataSource,
        coordinate: Coordinate,
        today: NaiveDate,
    ) -> Result<HistoricalSeries> {
        match tier {
            DataSource::RecentApi => {
                let records = self
                    .source
                    .recent_daily(coordinate, RECENT_WINDOW_DAYS)
                    .await?;
                let mut rows: Vec<RawRow> = records.into_iter().map(RawRow::from).collect();
                trim_tail(&mut rows, tier);
                let valid = rows.iter().filter(|r| r.is_valid()).count();
                if valid < MIN_RECENT_ROWS {
                    return Err(WeatherwiseError::insufficient(format!(
                        "recent window has {valid} valid rows, need {MIN_RECENT_ROWS}"
                    )));
                }
                clean::clean(rows, DataSource::RecentApi)
            }
            DataSource::ArchiveApi => {
                let start = today - Duration::days(ARCHIVE_WINDOW_DAYS);
                let records = self.source.archive_daily(coordinate, start, today).await?;
                let mut rows: Vec<RawRow> = records.into_iter().map(RawRow::from).collect();
                trim_tail(&mut rows, tier);
                if !rows.iter().any(RawRow::is_valid) {
                    return Err(WeatherwiseError::insufficient("archive returned no usable rows"));
                }
                clean::clean(rows, DataSource::ArchiveApi)
            }
            DataSource::File => {
                let path = self
                    .csv_path
                    .clone()
                    .ok_or_else(|| WeatherwiseError::insufficient("no data file configured"))?;
                debug!(path = %path.display(), "reading data file");
                task::spawn_blocking(move || file::read_series(&path))
                    .await
                    .map_err(|e| WeatherwiseError::insufficient(format!("file reader panicked: {e}")))?
            }
            DataSource::Synthetic => Ok(synthetic::generate(today, self.synthetic_seed)),
        }
    }
}

fn trim_tail(rows: &mut Vec<RawRow>, tier: DataSource) {
    let dropped = clean::drop_unobserved_tail(rows);
    if dropped > 0 {
        debug!(tier = %tier, dropped, "dropped trailing rows without temperature");
    }
}
