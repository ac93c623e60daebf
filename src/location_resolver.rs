//! City name to coordinate resolution
//!
//! Names are resolved against a built-in table of major cities first, then
//! through the geocoding service with a preference for national results,
//! administrative seats and populous places. Resolution never fails: an
//! unresolvable name falls back to the configured default city.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::BoundedCache;
use crate::models::Coordinate;
use crate::weather::{GeocodingCandidate, Geocoder, IpLocation};

/// Country preferred when geocoding results span several countries
pub const NATIONAL_COUNTRY_CODE: &str = "CN";

const BEIJING: Coordinate = Coordinate::new(39.9042, 116.4074);

/// Major cities resolved without a network call
const KNOWN_CITIES: &[(&str, Coordinate)] = &[
    ("北京", BEIJING),
    ("上海", Coordinate::new(31.2304, 121.4737)),
    ("广州", Coordinate::new(23.1291, 113.2644)),
    ("深圳", Coordinate::new(22.5431, 114.0579)),
    ("杭州", Coordinate::new(30.2741, 120.1551)),
    ("成都", Coordinate::new(30.5728, 104.0668)),
    ("天津", Coordinate::new(39.3434, 117.3616)),
    ("南京", Coordinate::new(32.0603, 118.7969)),
    ("武汉", Coordinate::new(30.5928, 114.3055)),
    ("西安", Coordinate::new(34.3416, 108.9398)),
    ("重庆", Coordinate::new(29.5630, 106.5516)),
    ("苏州", Coordinate::new(31.2989, 120.5853)),
    ("青岛", Coordinate::new(36.0662, 120.3826)),
    ("沈阳", Coordinate::new(41.8057, 123.4315)),
    ("大连", Coordinate::new(38.9140, 121.6147)),
    ("厦门", Coordinate::new(24.4798, 118.0894)),
    ("南宁", Coordinate::new(22.8170, 108.3669)),
];

/// Look up a city in the built-in table
#[must_use]
pub fn known_city(name: &str) -> Option<Coordinate> {
    KNOWN_CITIES
        .iter()
        .find(|(city, _)| *city == name)
        .map(|(_, coordinate)| *coordinate)
}

/// Split `"city,province"` into the place name and the province hint.
///
/// Full-width commas are accepted; only the first comma splits.
#[must_use]
pub fn split_province_hint(raw: &str) -> (String, Option<String>) {
    let normalized = raw.replace('，', ",");
    match normalized.split_once(',') {
        Some((city, hint)) => {
            let hint = hint.trim();
            (
                city.trim().to_string(),
                (!hint.is_empty()).then(|| hint.to_string()),
            )
        }
        None => (normalized.trim().to_string(), None),
    }
}

/// Rank of a GeoNames feature code for forward lookups
#[must_use]
pub fn settlement_rank(feature_code: Option<&str>) -> u8 {
    match feature_code {
        Some("PPLC") => 4,
        Some("PPLA" | "PPLA2" | "PPLA3" | "PPLA4") => 3,
        Some(code) if code.starts_with("PPL") => 2,
        _ => 1,
    }
}

/// Rank of a GeoNames feature code for reverse lookups
#[must_use]
pub fn reverse_rank(feature_code: Option<&str>) -> u8 {
    match feature_code {
        Some("PPLC") => 5,
        Some("PPLA" | "PPLA2") => 4,
        Some("PPLA3" | "PPLA4") => 3,
        Some(code) if code.starts_with("PPL") => 2,
        _ => 1,
    }
}

fn is_national(candidate: &GeocodingCandidate) -> bool {
    candidate
        .country_code
        .as_deref()
        .is_some_and(|code| code.eq_ignore_ascii_case(NATIONAL_COUNTRY_CODE))
}

/// Pick the best forward geocoding candidate.
///
/// National results win over foreign ones; a province hint narrows further
/// when it matches at least one candidate; ties fall to settlement rank and
/// then population.
#[must_use]
pub fn pick_best_candidate(
    candidates: Vec<GeocodingCandidate>,
    province_hint: Option<&str>,
) -> Option<GeocodingCandidate> {
    let mut pool = candidates;
    if pool.iter().any(is_national) {
        pool.retain(is_national);
    }

    if let Some(hint) = province_hint {
        let matches_hint = |c: &GeocodingCandidate| {
            c.admin1.as_deref().is_some_and(|admin| {
                !admin.is_empty() && (admin.contains(hint) || hint.contains(admin))
            })
        };
        if pool.iter().any(matches_hint) {
            pool.retain(matches_hint);
        }
    }

    pool.sort_by(|a, b| {
        settlement_rank(b.feature_code.as_deref())
            .cmp(&settlement_rank(a.feature_code.as_deref()))
            .then(b.population.unwrap_or(0).cmp(&a.population.unwrap_or(0)))
    });
    pool.into_iter().next()
}

/// Pick the place that best names a coordinate: national first, then
/// administrative level, then distance.
#[must_use]
pub fn pick_nearest_candidate(
    candidates: Vec<GeocodingCandidate>,
    origin: Coordinate,
) -> Option<GeocodingCandidate> {
    candidates.into_iter().min_by(|a, b| {
        is_national(b)
            .cmp(&is_national(a))
            .then(reverse_rank(b.feature_code.as_deref()).cmp(&reverse_rank(a.feature_code.as_deref())))
            .then(
                origin
                    .distance_km(&a.coordinate())
                    .total_cmp(&origin.distance_km(&b.coordinate())),
            )
    })
}

/// Resolves free-form city names to coordinates
pub struct CoordinateResolver {
    geocoder: Arc<dyn Geocoder>,
    cache: BoundedCache<Coordinate>,
    default_city: String,
}

impl CoordinateResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, capacity: u64, default_city: impl Into<String>) -> Self {
        Self {
            geocoder,
            cache: BoundedCache::new("coordinates", capacity),
            default_city: default_city.into(),
        }
    }

    #[must_use]
    pub fn default_city(&self) -> &str {
        &self.default_city
    }

    /// Resolve a city name. Empty input resolves to the default city and
    /// results are memoized by the raw input.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Coordinate {
        self.cache
            .get_or_insert_with(name, self.resolve_uncached(name))
            .await
    }

    async fn resolve_uncached(&self, raw: &str) -> Coordinate {
        let trimmed = raw.trim();
        let query = if trimmed.is_empty() {
            self.default_city.as_str()
        } else {
            trimmed
        };

        let (place, hint) = split_province_hint(query);
        if let Some(coordinate) = known_city(&place) {
            debug!(city = %place, "resolved from built-in table");
            return coordinate;
        }

        match self.geocode(&place, hint.as_deref()).await {
            Some(candidate) => {
                debug!(
                    city = query,
                    matched = %candidate.name,
                    admin1 = candidate.admin1.as_deref().unwrap_or(""),
                    "resolved via geocoding"
                );
                candidate.coordinate()
            }
            None => {
                warn!(city = query, fallback = %self.default_city, "could not resolve city, using default");
                self.default_coordinate()
            }
        }
    }

    async fn geocode(&self, place: &str, hint: Option<&str>) -> Option<GeocodingCandidate> {
        match self.geocoder.search(place).await {
            Ok(candidates) => pick_best_candidate(candidates, hint),
            Err(e) => {
                debug!(city = place, error = %e, "geocoding failed");
                None
            }
        }
    }

    fn default_coordinate(&self) -> Coordinate {
        known_city(&self.default_city).unwrap_or(BEIJING)
    }

    /// Name of the place closest to a coordinate.
    ///
    /// Uses reverse geocoding and falls back to the nearest built-in city.
    #[instrument(skip(self))]
    pub async fn nearest_city(&self, coordinate: Coordinate) -> String {
        match self.geocoder.reverse(coordinate).await {
            Ok(candidates) => {
                if let Some(best) = pick_nearest_candidate(candidates, coordinate) {
                    return best.name;
                }
            }
            Err(e) => debug!(error = %e, "reverse geocoding failed"),
        }
        nearest_known_city(coordinate).to_string()
    }

    /// Name a place reported by IP geolocation.
    ///
    /// The reported coordinate is reverse geocoded first. When that yields
    /// nothing, the reported city name is searched and the first national
    /// result taken. A coordinate with no usable answer falls back to the
    /// nearest built-in city.
    #[instrument(skip(self))]
    pub async fn city_for_location(&self, location: &IpLocation) -> Option<String> {
        if let Some(coordinate) = location.coordinate {
            match self.geocoder.reverse(coordinate).await {
                Ok(candidates) => {
                    if let Some(best) = pick_nearest_candidate(candidates, coordinate) {
                        return Some(best.name);
                    }
                }
                Err(e) => debug!(error = %e, "reverse geocoding failed"),
            }
        }

        if let Some(reported) = location.city.as_deref() {
            match self.geocoder.search(reported).await {
                Ok(candidates) => {
                    let first = candidates
                        .iter()
                        .find(|c| is_national(c))
                        .or_else(|| candidates.first());
                    if let Some(candidate) = first {
                        return Some(candidate.name.clone());
                    }
                }
                Err(e) => debug!(city = reported, error = %e, "geocoding failed"),
            }
        }

        location
            .coordinate
            .map(|coordinate| nearest_known_city(coordinate).to_string())
    }
}

fn nearest_known_city(coordinate: Coordinate) -> &'static str {
    KNOWN_CITIES
        .iter()
        .min_by(|(_, a), (_, b)| {
            coordinate
                .distance_km(a)
                .total_cmp(&coordinate.distance_km(b))
        })
        .map_or("北京", |(name, _)| *name)
}
