//! Windowed sequence model for the secondary temperature forecast
//!
//! A single-hidden-layer network reads a fixed lookback window of
//! standardised values and predicts the next one. Multi-step forecasts feed
//! each prediction back into the window.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Result, WeatherwiseError};

/// Training windows required before the model is attempted
pub const MIN_TRAINING_WINDOWS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceConfig {
    pub lookback: usize,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            lookback: 14,
            hidden_units: 16,
            epochs: 60,
            learning_rate: 0.01,
            seed: 7,
        }
    }
}

/// Adam optimiser state for one parameter block
#[derive(Debug, Clone)]
struct Adam {
    m: Vec<f64>,
    v: Vec<f64>,
    step: i32,
    learning_rate: f64,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPSILON: f64 = 1e-8;

    fn new(len: usize, learning_rate: f64) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
            step: 0,
            learning_rate,
        }
    }

    fn update(&mut self, params: &mut [f64], grads: &[f64]) {
        self.step += 1;
        let correction1 = 1.0 - Self::BETA1.powi(self.step);
        let correction2 = 1.0 - Self::BETA2.powi(self.step);
        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            self.m[i] = Self::BETA1 * self.m[i] + (1.0 - Self::BETA1) * grad;
            self.v[i] = Self::BETA2 * self.v[i] + (1.0 - Self::BETA2) * grad * grad;
            let m_hat = self.m[i] / correction1;
            let v_hat = self.v[i] / correction2;
            *param -= self.learning_rate * m_hat / (v_hat.sqrt() + Self::EPSILON);
        }
    }
}

/// A trained network with its standardisation
#[derive(Debug, Clone)]
pub struct SequenceModel {
    lookback: usize,
    w1: DMatrix<f64>,
    b1: DVector<f64>,
    w2: DVector<f64>,
    b2: f64,
    mean: f64,
    std: f64,
}

impl SequenceModel {
    /// Train on `series`. Fails with too few windows or a diverging loss.
    #[allow(clippy::cast_precision_loss)]
    pub fn train(series: &[f64], config: &SequenceConfig) -> Result<Self> {
        let lookback = config.lookback;
        if lookback == 0 || series.len() <= lookback {
            return Err(WeatherwiseError::insufficient("series shorter than the lookback"));
        }
        let windows = series.len() - lookback;
        if windows < MIN_TRAINING_WINDOWS {
            return Err(WeatherwiseError::insufficient(format!(
                "{windows} training windows, need {MIN_TRAINING_WINDOWS}"
            )));
        }

        let n = series.len() as f64;
        let mean = series.iter().sum::<f64>() / n;
        let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = if variance.sqrt() > 1e-6 { variance.sqrt() } else { 1.0 };
        let scaled: Vec<f64> = series.iter().map(|v| (v - mean) / std).collect();

        let inputs = DMatrix::from_fn(lookback, windows, |r, c| scaled[c + r]);
        let targets = DVector::from_fn(windows, |r, _| scaled[r + lookback]);

        let hidden = config.hidden_units.max(1);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let limit1 = (6.0 / (lookback + hidden) as f64).sqrt();
        let limit2 = (6.0 / (hidden + 1) as f64).sqrt();
        let mut model = Self {
            lookback,
            w1: DMatrix::from_fn(hidden, lookback, |_, _| rng.random_range(-limit1..limit1)),
            b1: DVector::zeros(hidden),
            w2: DVector::from_fn(hidden, |_, _| rng.random_range(-limit2..limit2)),
            b2: 0.0,
            mean,
            std,
        };

        let mut adam_w1 = Adam::new(hidden * lookback, config.learning_rate);
        let mut adam_b1 = Adam::new(hidden, config.learning_rate);
        let mut adam_w2 = Adam::new(hidden, config.learning_rate);
        let mut adam_b2 = Adam::new(1, config.learning_rate);

        let mut loss = f64::INFINITY;
        for _ in 0..config.epochs {
            // forward pass over the whole batch
            let mut activations = &model.w1 * &inputs;
            for c in 0..windows {
                for r in 0..hidden {
                    activations[(r, c)] = (activations[(r, c)] + model.b1[r]).tanh();
                }
            }
            let predictions = activations.tr_mul(&model.w2).add_scalar(model.b2);
            let errors = predictions - &targets;
            loss = errors.norm_squared() / windows as f64;

            // gradients of the mean squared error
            let d_out = errors * (2.0 / windows as f64);
            let grad_w2 = &activations * &d_out;
            let grad_b2 = d_out.sum();
            let mut d_hidden = &model.w2 * d_out.transpose();
            for c in 0..windows {
                for r in 0..hidden {
                    let a = activations[(r, c)];
                    d_hidden[(r, c)] *= 1.0 - a * a;
                }
            }
            let grad_w1 = &d_hidden * inputs.transpose();
            let grad_b1 = d_hidden.column_sum();

            adam_w1.update(model.w1.as_mut_slice(), grad_w1.as_slice());
            adam_b1.update(model.b1.as_mut_slice(), grad_b1.as_slice());
            adam_w2.update(model.w2.as_mut_slice(), grad_w2.as_slice());
            adam_b2.update(std::slice::from_mut(&mut model.b2), &[grad_b2]);
        }

        if !loss.is_finite() {
            return Err(WeatherwiseError::model_fit("sequence model diverged"));
        }
        debug!(loss, windows, "sequence model trained");
        Ok(model)
    }

    fn predict_scaled(&self, window: &[f64]) -> f64 {
        let input = DVector::from_column_slice(window);
        let mut hidden = &self.w1 * input + &self.b1;
        hidden.apply(|v| *v = v.tanh());
        self.w2.dot(&hidden) + self.b2
    }

    /// Recursive forecast `steps` ahead, seeded with the tail of `history`.
    pub fn forecast(&self, history: &[f64], steps: usize) -> Result<Vec<f64>> {
        if history.len() < self.lookback {
            return Err(WeatherwiseError::insufficient("history shorter than the lookback"));
        }
        let mut window: Vec<f64> = history[history.len() - self.lookback..]
            .iter()
            .map(|v| (v - self.mean) / self.std)
            .collect();

        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let next = self.predict_scaled(&window);
            if !next.is_finite() {
                return Err(WeatherwiseError::model_fit("sequence model produced a non-finite value"));
            }
            window.rotate_left(1);
            if let Some(slot) = window.last_mut() {
                *slot = next;
            }
            out.push(next * self.std + self.mean);
        }
        Ok(out)
    }
}

/// Train and forecast, `None` when the model is unavailable for any reason.
#[must_use]
pub fn sequence_forecast(series: &[f64], steps: usize, config: &SequenceConfig) -> Option<Vec<f64>> {
    match SequenceModel::train(series, config).and_then(|model| model.forecast(series, steps)) {
        Ok(values) => Some(values),
        Err(e) => {
            debug!(error = %e, "sequence model unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn seasonal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 15.0 + 8.0 * (2.0 * PI * i as f64 / 20.0).sin())
            .collect()
    }

    #[test]
    fn test_too_few_windows_is_unavailable() {
        let series: Vec<f64> = (0..20).map(f64::from).collect();
        assert!(matches!(
            SequenceModel::train(&series, &SequenceConfig::default()),
            Err(WeatherwiseError::InsufficientData { .. })
        ));
        assert!(sequence_forecast(&series, 3, &SequenceConfig::default()).is_none());
    }

    #[test]
    fn test_forecast_has_requested_length() {
        let series = seasonal(200);
        let values = sequence_forecast(&series, 7, &SequenceConfig::default()).unwrap();
        assert_eq!(values.len(), 7);
        assert!(values.iter().all(|v| v.is_finite()));
        // predictions stay in the neighbourhood of the training range
        assert!(values.iter().all(|v| (-5.0..35.0).contains(v)));
    }

    #[test]
    fn test_training_is_deterministic() {
        let series = seasonal(120);
        let config = SequenceConfig::default();
        assert_eq!(
            sequence_forecast(&series, 5, &config),
            sequence_forecast(&series, 5, &config)
        );
    }

    #[test]
    fn test_learns_a_periodic_signal() {
        let series = seasonal(300);
        let config = SequenceConfig {
            epochs: 400,
            ..SequenceConfig::default()
        };
        let values = sequence_forecast(&series, 1, &config).unwrap();
        let expected = 15.0 + 8.0 * (2.0 * PI * 300.0 / 20.0).sin();
        assert!((values[0] - expected).abs() < 4.0, "got {}", values[0]);
    }

    #[test]
    fn test_constant_series_does_not_divide_by_zero() {
        let series = vec![4.0; 40];
        let values = sequence_forecast(&series, 2, &SequenceConfig::default()).unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
