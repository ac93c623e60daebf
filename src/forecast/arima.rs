//! Autoregressive integrated moving-average models
//!
//! Parameters are estimated with the two-stage Hannan-Rissanen regression:
//! a long autoregression supplies innovation estimates, then the series is
//! regressed on its own lags and the lagged innovations. The conditional
//! sum-of-squares likelihood of the fitted model gives the AIC used for
//! order selection.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::f64::consts::PI;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Result, WeatherwiseError};

/// `(p, d, q)`: autoregressive lags, differencing passes, moving-average lags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Orders tried during selection; the first one is the default
pub const CANDIDATE_ORDERS: [ArimaOrder; 5] = [
    ArimaOrder::new(2, 1, 2),
    ArimaOrder::new(5, 1, 0),
    ArimaOrder::new(1, 1, 1),
    ArimaOrder::new(2, 1, 0),
    ArimaOrder::new(0, 1, 2),
];

/// In-sample points averaged for the bias correction
pub const BIAS_WINDOW: usize = 14;
/// Trailing points averaged by the persistence fallback
pub const PERSISTENCE_WINDOW: usize = 7;

/// Regression rows required beyond the parameter count
const MIN_SPARE_ROWS: usize = 8;
const RANK_EPS: f64 = 1e-10;

/// A fitted model
#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ArimaOrder,
    phi: Vec<f64>,
    theta: Vec<f64>,
    /// Mean removed before fitting; zero once the series is differenced
    mean: f64,
    /// `levels[0]` is the input, `levels[k]` its k-th difference
    levels: Vec<Vec<f64>>,
    /// Mean-removed differenced series
    centered: Vec<f64>,
    /// One-step residuals aligned with `centered`
    residuals: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

fn difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Ordinary least squares through the SVD; rank-deficient designs fail.
fn least_squares(design: DMatrix<f64>, target: DVector<f64>) -> Result<DVector<f64>> {
    let columns = design.ncols();
    let svd = design.svd(true, true);
    if svd.rank(RANK_EPS) < columns {
        return Err(WeatherwiseError::model_fit("singular design matrix"));
    }
    let beta = svd
        .solve(&target, RANK_EPS)
        .map_err(|e| WeatherwiseError::model_fit(e.to_string()))?;
    if beta.iter().all(|b| b.is_finite()) {
        Ok(beta)
    } else {
        Err(WeatherwiseError::model_fit("non-finite coefficients"))
    }
}

/// Regress `z[t]` on the given lagged columns for `t` in `start..z.len()`.
fn lag_regression(z: &[f64], start: usize, lags: &[(&[f64], usize)]) -> Result<DVector<f64>> {
    let rows = z.len() - start;
    let design = DMatrix::from_fn(rows, lags.len(), |r, c| {
        let (source, lag) = lags[c];
        source[start + r - lag]
    });
    let target = DVector::from_fn(rows, |r, _| z[start + r]);
    least_squares(design, target)
}

/// All roots of the lag polynomial described by `coefficients` lie inside the
/// unit circle of the companion matrix.
fn is_stable(coefficients: &[f64]) -> bool {
    let k = coefficients.len();
    if k == 0 {
        return true;
    }
    let companion = DMatrix::from_fn(k, k, |r, c| {
        if r == 0 {
            coefficients[c]
        } else if r == c + 1 {
            1.0
        } else {
            0.0
        }
    });
    companion
        .complex_eigenvalues()
        .iter()
        .all(|root| root.norm() < 1.0)
}

/// Innovations estimated by a long autoregression, plus its order.
fn long_ar_innovations(z: &[f64], min_order: usize) -> Result<(Vec<f64>, usize)> {
    let n = z.len();
    let heuristic = (n as f64).ln().powi(2).round() as usize;
    let order = heuristic.max(min_order).min(n / 4);
    if order < min_order {
        return Err(WeatherwiseError::insufficient(format!(
            "{n} points are too few for a long autoregression"
        )));
    }

    let lags: Vec<(&[f64], usize)> = (1..=order).map(|lag| (z, lag)).collect();
    let coefficients = lag_regression(z, order, &lags)?;

    let mut innovations = vec![0.0; n];
    for t in order..n {
        let fitted: f64 = (1..=order).map(|lag| coefficients[lag - 1] * z[t - lag]).sum();
        innovations[t] = z[t] - fitted;
    }
    Ok((innovations, order))
}

/// Conditional one-step residuals; the first `p` are fixed at zero.
fn css_residuals(z: &[f64], phi: &[f64], theta: &[f64]) -> Vec<f64> {
    let mut residuals = vec![0.0; z.len()];
    for t in phi.len()..z.len() {
        let ar: f64 = phi.iter().enumerate().map(|(i, a)| a * z[t - 1 - i]).sum();
        let ma: f64 = theta
            .iter()
            .enumerate()
            .filter(|(j, _)| *j < t)
            .map(|(j, b)| b * residuals[t - 1 - j])
            .sum();
        residuals[t] = z[t] - ar - ma;
    }
    residuals
}

impl ArimaModel {
    /// Fit `order` to `series`.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(series: &[f64], order: ArimaOrder) -> Result<Self> {
        let ArimaOrder { p, d, q } = order;
        if series.iter().any(|v| !v.is_finite()) {
            return Err(WeatherwiseError::model_fit("series contains non-finite values"));
        }

        let mut levels = vec![series.to_vec()];
        for _ in 0..d {
            let next = difference(levels.last().map_or(&[][..], Vec::as_slice));
            levels.push(next);
        }
        let y = levels.last().map_or(&[][..], Vec::as_slice);
        let level_mean = if d == 0 { mean(y) } else { 0.0 };
        let centered: Vec<f64> = y.iter().map(|v| v - level_mean).collect();
        let n = centered.len();

        let (phi, theta) = if p + q == 0 {
            (Vec::new(), Vec::new())
        } else {
            let (innovations, long_order) = if q > 0 {
                long_ar_innovations(&centered, p + q + 1)?
            } else {
                (vec![0.0; n], 0)
            };
            let start = p.max(long_order + q);
            if n < start + p + q + MIN_SPARE_ROWS {
                return Err(WeatherwiseError::insufficient(format!(
                    "{n} points are too few for order {order}"
                )));
            }
            let mut lags: Vec<(&[f64], usize)> = (1..=p).map(|lag| (&centered[..], lag)).collect();
            lags.extend((1..=q).map(|lag| (&innovations[..], lag)));
            let beta = lag_regression(&centered, start, &lags)?;
            (beta.as_slice()[..p].to_vec(), beta.as_slice()[p..].to_vec())
        };

        if !is_stable(&phi) {
            return Err(WeatherwiseError::model_fit(format!("order {order} is not stationary")));
        }
        let negated: Vec<f64> = theta.iter().map(|b| -b).collect();
        if !is_stable(&negated) {
            return Err(WeatherwiseError::model_fit(format!("order {order} is not invertible")));
        }

        let residuals = css_residuals(&centered, &phi, &theta);
        let effective = &residuals[p.min(n)..];
        if effective.len() <= p + q + 1 {
            return Err(WeatherwiseError::insufficient(format!(
                "{n} points are too few for order {order}"
            )));
        }
        let n_eff = effective.len() as f64;
        let sigma2 = effective.iter().map(|r| r * r).sum::<f64>() / n_eff;
        if !sigma2.is_finite() || sigma2 <= f64::EPSILON {
            return Err(WeatherwiseError::model_fit("degenerate residual variance"));
        }

        let log_likelihood = -0.5 * n_eff * ((2.0 * PI * sigma2).ln() + 1.0);
        let params = p + q + 1 + usize::from(d == 0);
        let aic = 2.0 * params as f64 - 2.0 * log_likelihood;

        Ok(Self {
            order,
            phi,
            theta,
            mean: level_mean,
            levels,
            centered,
            residuals,
            sigma2,
            aic,
        })
    }

    #[must_use]
    pub const fn order(&self) -> ArimaOrder {
        self.order
    }

    #[must_use]
    pub const fn aic(&self) -> f64 {
        self.aic
    }

    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    #[must_use]
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.phi
    }

    #[must_use]
    pub fn ma_coefficients(&self) -> &[f64] {
        &self.theta
    }

    /// Point forecast `steps` days ahead on the original scale
    #[must_use]
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let n = self.centered.len();
        let mut z = self.centered.clone();
        let mut e = self.residuals.clone();
        for _ in 0..steps {
            let t = z.len();
            let ar: f64 = self
                .phi
                .iter()
                .enumerate()
                .filter(|(i, _)| *i < t)
                .map(|(i, a)| a * z[t - 1 - i])
                .sum();
            let ma: f64 = self
                .theta
                .iter()
                .enumerate()
                .filter(|(j, _)| *j < t)
                .map(|(j, b)| b * e[t - 1 - j])
                .sum();
            z.push(ar + ma);
            e.push(0.0);
        }

        let mut out: Vec<f64> = z[n..].iter().map(|v| v + self.mean).collect();
        for level in self.levels.iter().take(self.order.d).rev() {
            let mut last = level.last().copied().unwrap_or(0.0);
            out = out
                .into_iter()
                .map(|delta| {
                    last += delta;
                    last
                })
                .collect();
        }
        out
    }

    /// Mean of `actual - fitted` over the last `window` in-sample points.
    ///
    /// A one-step prediction error of the differenced series equals the
    /// error on the original scale, so this is the mean of the trailing
    /// residuals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn recent_bias(&self, window: usize) -> Option<f64> {
        let usable = &self.residuals[self.order.p.min(self.residuals.len())..];
        let tail = &usable[usable.len().saturating_sub(window)..];
        if tail.is_empty() {
            None
        } else {
            Some(tail.iter().sum::<f64>() / tail.len() as f64)
        }
    }
}

/// Lowest-AIC candidate that fits, or the first candidate when none fit.
#[must_use]
pub fn select_order(series: &[f64]) -> (ArimaOrder, Option<ArimaModel>) {
    let mut best: Option<ArimaModel> = None;
    for order in CANDIDATE_ORDERS {
        match ArimaModel::fit(series, order) {
            Ok(model) => {
                debug!(%order, aic = model.aic(), "candidate fitted");
                if best.as_ref().is_none_or(|b| model.aic() < b.aic()) {
                    best = Some(model);
                }
            }
            Err(e) => debug!(%order, error = %e, "candidate rejected"),
        }
    }
    match best {
        Some(model) => (model.order(), Some(model)),
        None => (CANDIDATE_ORDERS[0], None),
    }
}

/// Result of the primary statistical forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArimaForecast {
    /// Order used, `None` when the persistence fallback produced the values
    pub order: Option<ArimaOrder>,
    pub values: Vec<f64>,
    /// Additive correction already applied to `values`
    pub bias: f64,
}

/// Mean of the trailing [`PERSISTENCE_WINDOW`] points repeated `steps` times
#[must_use]
pub fn persistence_forecast(series: &[f64], steps: usize) -> Vec<f64> {
    let tail = &series[series.len().saturating_sub(PERSISTENCE_WINDOW)..];
    vec![mean(tail); steps]
}

/// Select, fit and forecast with bias correction.
///
/// Falls back to a persistence forecast when no candidate order can be fitted.
#[must_use]
pub fn forecast_series(series: &[f64], steps: usize) -> ArimaForecast {
    let (order, model) = select_order(series);
    // refitting the default order would fail the same way it did during selection
    let Some(model) = model else {
        warn!(%order, points = series.len(), "no order could be fitted, using persistence forecast");
        return ArimaForecast {
            order: None,
            values: persistence_forecast(series, steps),
            bias: 0.0,
        };
    };

    let bias = model.recent_bias(BIAS_WINDOW).unwrap_or(0.0);
    let values = model.forecast(steps).into_iter().map(|v| v + bias).collect();
    ArimaForecast {
        order: Some(order),
        values,
        bias,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn noise(rng: &mut StdRng) -> f64 {
        rng.sample::<f64, _>(StandardNormal)
    }

    /// Integrated AR(1) with the given coefficient
    fn integrated_ar1(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut level = 10.0;
        let mut prev = 0.0;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let diff = phi * prev + noise(&mut rng);
            level += diff;
            prev = diff;
            out.push(level);
        }
        out
    }

    /// Integrated MA(1) with the given coefficient
    fn integrated_ma1(theta: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut level = 0.0;
        let mut prev_shock = 0.0;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let shock = noise(&mut rng);
            level += shock + theta * prev_shock;
            prev_shock = shock;
            out.push(level);
        }
        out
    }

    #[test]
    fn test_recovers_ar_coefficient() {
        let series = integrated_ar1(0.6, 400, 1);
        let model = ArimaModel::fit(&series, ArimaOrder::new(1, 1, 0)).unwrap();
        let phi = model.ar_coefficients()[0];
        assert!((phi - 0.6).abs() < 0.15, "phi = {phi}");
        assert!((model.sigma2() - 1.0).abs() < 0.3);
    }

    #[test]
    fn test_recovers_ma_coefficient() {
        let series = integrated_ma1(0.5, 600, 2);
        let model = ArimaModel::fit(&series, ArimaOrder::new(0, 1, 1)).unwrap();
        let theta = model.ma_coefficients()[0];
        assert!((theta - 0.5).abs() < 0.2, "theta = {theta}");
    }

    #[test]
    fn test_forecast_integrates_back_to_levels() {
        let series = integrated_ar1(0.5, 200, 3);
        let model = ArimaModel::fit(&series, ArimaOrder::new(1, 1, 0)).unwrap();
        let forecast = model.forecast(5);
        let last = *series.last().unwrap();

        assert_eq!(forecast.len(), 5);
        // AR(1) on differences decays, so the level settles near the last value
        assert!(forecast.iter().all(|v| (v - last).abs() < 10.0));
        let last_diff = series[199] - series[198];
        let expected_first = last + model.ar_coefficients()[0] * last_diff;
        assert!((forecast[0] - expected_first).abs() < 1e-9);
    }

    #[test]
    fn test_select_order_picks_a_candidate() {
        let series = integrated_ar1(0.4, 300, 4);
        let (order, model) = select_order(&series);
        assert!(CANDIDATE_ORDERS.contains(&order));
        assert!(model.unwrap().aic().is_finite());
    }

    #[test]
    fn test_short_series_uses_persistence() {
        let series = [1.0, 2.0, 3.0, 4.0, 5.0];
        let forecast = forecast_series(&series, 3);
        assert_eq!(forecast.order, None);
        assert_eq!(forecast.values, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_constant_series_uses_persistence() {
        let series = vec![12.5; 120];
        let forecast = forecast_series(&series, 4);
        assert_eq!(forecast.order, None);
        assert_eq!(forecast.values, vec![12.5; 4]);
    }

    #[test]
    fn test_bias_is_applied() {
        let series = integrated_ar1(0.3, 250, 5);
        let result = forecast_series(&series, 7);
        assert_eq!(result.values.len(), 7);
        assert!(result.order.is_some());
        assert!(result.values.iter().all(|v| v.is_finite()));

        let model = ArimaModel::fit(&series, result.order.unwrap()).unwrap();
        let raw = model.forecast(7);
        assert!((result.values[0] - raw[0] - result.bias).abs() < 1e-9);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_bias_is_mean_of_trailing_errors() {
        let series = integrated_ar1(0.3, 120, 6);
        let model = ArimaModel::fit(&series, ArimaOrder::new(1, 1, 0)).unwrap();
        let phi = model.ar_coefficients()[0];

        // one-step fit of an ARIMA(1,1,0) on the original scale
        let n = series.len();
        let expected = (n - BIAS_WINDOW..n)
            .map(|t| {
                let fitted = series[t - 1] + phi * (series[t - 1] - series[t - 2]);
                series[t] - fitted
            })
            .sum::<f64>()
            / BIAS_WINDOW as f64;

        let bias = model.recent_bias(BIAS_WINDOW).unwrap();
        assert!((bias - expected).abs() < 1e-9, "bias {bias}, expected {expected}");
    }

    #[test]
    fn test_stability_check() {
        assert!(!is_stable(&[1.2]));
        assert!(is_stable(&[0.5, 0.2]));
    }
}
