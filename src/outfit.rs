//! Clothing suggestions for a single day

use tracing::debug;

/// Temperature and weather conditions a suggestion is based on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub wind_speed_ms: f64,
    pub humidity: f64,
}

impl Conditions {
    fn distance(&self, other: &Self) -> f64 {
        ((self.temperature_c - other.temperature_c).powi(2)
            + (self.precipitation_mm - other.precipitation_mm).powi(2)
            + (self.wind_speed_ms - other.wind_speed_ms).powi(2)
            + (self.humidity - other.humidity).powi(2))
        .sqrt()
    }
}

/// Precipitation above which rain gear is added
pub const RAIN_GEAR_MM: f64 = 5.0;
/// Wind speed above which wind protection is added
pub const WIND_PROTECTION_MS: f64 = 6.0;
/// Prototypes consulted after the rules
pub const NEIGHBOURS: usize = 2;

pub const RAIN_GEAR: &str = "umbrella or raincoat";
pub const WIND_PROTECTION: &str = "windproof jacket and hat";

const fn conditions(temperature_c: f64, precipitation_mm: f64, wind_speed_ms: f64, humidity: f64) -> Conditions {
    Conditions {
        temperature_c,
        precipitation_mm,
        wind_speed_ms,
        humidity,
    }
}

const PROTOTYPES: &[(&str, Conditions)] = &[
    ("winter wear (down jacket, thermal layers)", conditions(-5.0, 0.0, 3.0, 55.0)),
    ("spring/autumn wear (hoodie, jacket)", conditions(12.0, 0.0, 3.0, 55.0)),
    ("summer wear (t-shirt, shorts)", conditions(28.0, 0.0, 2.0, 60.0)),
    ("rain gear (raincoat, umbrella)", conditions(18.0, 12.0, 2.0, 70.0)),
    ("windproof wear (windbreaker, jacket)", conditions(10.0, 0.0, 7.0, 55.0)),
];

/// Primary garment for a temperature
#[must_use]
pub fn temperature_band(temperature_c: f64) -> &'static str {
    match temperature_c {
        t if t < 5.0 => "down jacket, heavy coat and thermal underwear",
        t if t < 12.0 => "coat, sweater and long trousers",
        t if t < 20.0 => "light jacket and long trousers",
        t if t <= 28.0 => "shirt and light trousers",
        _ => "short sleeves, light skirt or shorts and sun protection",
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutfitRecommender;

impl OutfitRecommender {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Suggestions for one day: the band garment, any rain or wind extras,
    /// then the two closest prototypes not already listed.
    #[must_use]
    pub fn recommend(&self, temperature_c: f64, precipitation_mm: f64, wind_speed_ms: f64, humidity: f64) -> Vec<String> {
        let mut suggestions = vec![temperature_band(temperature_c).to_string()];
        if precipitation_mm > RAIN_GEAR_MM {
            suggestions.push(RAIN_GEAR.to_string());
        }
        if wind_speed_ms > WIND_PROTECTION_MS {
            suggestions.push(WIND_PROTECTION.to_string());
        }

        let query = conditions(temperature_c, precipitation_mm, wind_speed_ms, humidity);
        for label in nearest_prototypes(&query, NEIGHBOURS) {
            if !suggestions.iter().any(|s| s == label) {
                suggestions.push(label.to_string());
            }
        }
        debug!(temperature_c, count = suggestions.len(), "outfit recommended");
        suggestions
    }
}

/// Labels of the `k` prototypes closest to `query`, nearest first
#[must_use]
pub fn nearest_prototypes(query: &Conditions, k: usize) -> Vec<&'static str> {
    let mut ranked: Vec<(f64, &'static str)> = PROTOTYPES
        .iter()
        .map(|(label, proto)| (query.distance(proto), *label))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.into_iter().take(k).map(|(_, label)| label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-3.0, "down jacket, heavy coat and thermal underwear")]
    #[case(4.99, "down jacket, heavy coat and thermal underwear")]
    #[case(5.0, "coat, sweater and long trousers")]
    #[case(15.0, "light jacket and long trousers")]
    #[case(28.0, "shirt and light trousers")]
    #[case(31.0, "short sleeves, light skirt or shorts and sun protection")]
    fn test_temperature_bands(#[case] temperature: f64, #[case] expected: &str) {
        assert_eq!(temperature_band(temperature), expected);
    }

    #[test]
    fn test_cold_calm_day() {
        let recs = OutfitRecommender::new().recommend(-4.0, 0.0, 3.0, 55.0);
        assert_eq!(
            recs,
            vec![
                "down jacket, heavy coat and thermal underwear",
                "winter wear (down jacket, thermal layers)",
                "windproof wear (windbreaker, jacket)",
            ]
        );
    }

    #[test]
    fn test_wet_windy_day_adds_extras_first() {
        let recs = OutfitRecommender::new().recommend(16.0, 14.0, 9.0, 75.0);
        assert_eq!(recs[0], "light jacket and long trousers");
        assert_eq!(recs[1], RAIN_GEAR);
        assert_eq!(recs[2], WIND_PROTECTION);
        assert_eq!(recs[3], "rain gear (raincoat, umbrella)");
        assert_eq!(recs.len(), 5);
    }

    #[test]
    fn test_no_duplicates() {
        let recs = OutfitRecommender::new().recommend(12.0, 0.0, 3.0, 55.0);
        let mut unique = recs.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), recs.len());
    }
}
