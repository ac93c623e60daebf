//! Linear temperature trend over calendar days

use chrono::{Datelike, NaiveDate};

use crate::error::{Result, WeatherwiseError};

/// Ordinary least squares fit of temperature against the day number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Fit on `(date, temperature)` pairs, skipping non-finite temperatures.
    /// A single distinct date gives a flat line through the mean.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self> {
        let points: Vec<(f64, f64)> = points
            .into_iter()
            .filter(|(_, t)| t.is_finite())
            .map(|(d, t)| (f64::from(d.num_days_from_ce()), t))
            .collect();
        if points.is_empty() {
            return Err(WeatherwiseError::insufficient("no temperatures to fit a trend"));
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
        let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Ok(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    #[must_use]
    pub fn predict(&self, date: NaiveDate) -> f64 {
        self.intercept + self.slope * f64::from(date.num_days_from_ce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recovers_linear_warming() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let points = (0..30).map(|i| (start + Duration::days(i), 5.0 + 0.5 * i as f64));
        let trend = LinearTrend::fit(points).unwrap();

        assert!((trend.slope - 0.5).abs() < 1e-9);
        let predicted = trend.predict(start + Duration::days(40));
        assert!((predicted - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_date_is_flat() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let trend = LinearTrend::fit([(day, 4.0), (day, 6.0)]).unwrap();
        assert_eq!(trend.slope, 0.0);
        assert_eq!(trend.predict(day + chrono::Duration::days(100)), 5.0);
    }

    #[test]
    fn test_empty_is_an_error() {
        assert!(LinearTrend::fit(std::iter::empty()).is_err());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(LinearTrend::fit([(day, f64::NAN)]).is_err());
    }
}
