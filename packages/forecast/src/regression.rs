//! Linear regression on sliding-window features.

use gps_deform_signal::{linear_slope, mae, mean, mse, r_squared, std_dev};

use crate::{ForecastContext, Forecaster, MemberForecast, ModelFitError, split_point};

/// Linear model over the last `window` values plus their mean, standard
/// deviation, slope, maximum and minimum, trained by stochastic gradient
/// descent and applied recursively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFeatureRegression {
    pub window: usize,
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for LinearFeatureRegression {
    fn default() -> Self {
        Self {
            window: 10,
            epochs: 50,
            learning_rate: 0.001,
        }
    }
}

fn features(window: &[f64]) -> Vec<f64> {
    let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = window.iter().copied().fold(f64::INFINITY, f64::min);
    let mut out = window.to_vec();
    out.extend([mean(window), std_dev(window), linear_slope(window), max, min]);
    out
}

struct LinearModel {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearModel {
    fn predict(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .fold(self.bias, |acc, (w, x)| w.mul_add(*x, acc))
    }

    fn train(samples: &[(Vec<f64>, f64)], width: usize, epochs: usize, rate: f64) -> Self {
        let mut model = Self {
            weights: vec![0.0; width],
            bias: 0.0,
        };
        for _ in 0..epochs {
            for (x, y) in samples {
                let error = y - model.predict(x);
                for (w, xi) in model.weights.iter_mut().zip(x) {
                    *w += rate * error * xi;
                }
                model.bias += rate * error;
            }
        }
        model
    }
}

impl Forecaster for LinearFeatureRegression {
    fn name(&self) -> &'static str {
        "linear_feature_regression"
    }

    fn forecast(
        &self,
        series: &[f64],
        ctx: &ForecastContext,
    ) -> Result<MemberForecast, ModelFitError> {
        if series.len() <= self.window {
            return Err(ModelFitError::InsufficientHistory {
                required: self.window + 1,
                actual: series.len(),
            });
        }

        let samples: Vec<(Vec<f64>, f64)> = (self.window..series.len())
            .map(|i| (features(&series[i - self.window..i]), series[i]))
            .collect();
        let split = split_point(samples.len(), ctx.validation_split);
        let (train, test) = samples.split_at(split);
        let model = LinearModel::train(train, self.window + 5, self.epochs, self.learning_rate);

        let mut history = series.to_vec();
        let short_term = (1..=ctx.short_horizon)
            .map(|_| {
                let prediction = model.predict(&features(&history[history.len() - self.window..]));
                history.push(prediction);
                prediction
            })
            .collect();

        let mut rng = ctx.rng.clone();
        let mut history = series.to_vec();
        let long_term = (1..=ctx.long_horizon)
            .map(|step| {
                #[allow(clippy::cast_precision_loss)]
                let s = step as f64;
                let window = &history[history.len() - self.window..];
                let base = model.predict(&features(window));
                let uncertainty = (rng.next_f64() - 0.5) * s.sqrt() * 0.02;
                let trend_boost = linear_slope(window) * s * 0.1;
                let cycle = (0.1 * s).sin() * 0.001;
                let prediction = base + uncertainty + trend_boost + cycle;
                history.push(prediction);
                prediction
            })
            .collect();

        let (short_confidence, r2, mse, mae) = if test.is_empty() {
            (0.6, 0.0, 0.0, 0.0)
        } else {
            let actual: Vec<f64> = test.iter().map(|(_, y)| *y).collect();
            let predicted: Vec<f64> = test.iter().map(|(x, _)| model.predict(x)).collect();
            let r2 = r_squared(&actual, &predicted);
            (
                r2.clamp(0.1, 0.9),
                r2,
                mse(&actual, &predicted),
                mae(&actual, &predicted),
            )
        };

        Ok(MemberForecast {
            name: self.name().to_string(),
            short_term,
            long_term,
            short_confidence,
            long_confidence: short_confidence * 0.7,
            r2,
            mse,
            mae,
            degraded: false,
            stationary: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_vector_layout() {
        let f = features(&[1.0, 2.0, 3.0]);
        assert_eq!(f.len(), 8);
        assert!((f[3] - 2.0).abs() < f64::EPSILON);
        assert!((f[5] - 1.0).abs() < 1e-12);
        assert!((f[6] - 3.0).abs() < f64::EPSILON);
        assert!((f[7] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gradient_descent_learns_identity_signal() {
        // Target equals the last window value, so the model should learn to
        // weight recent values.
        let samples: Vec<(Vec<f64>, f64)> = (0..200)
            .map(|i| {
                let x = vec![f64::from(i % 7) / 7.0, 1.0];
                let y = x[0];
                (x, y)
            })
            .collect();
        let model = LinearModel::train(&samples, 2, 200, 0.05);
        assert!((model.predict(&[0.5, 1.0]) - 0.5).abs() < 0.05);
    }

    #[test]
    fn needs_more_than_one_window() {
        let err = LinearFeatureRegression::default()
            .forecast(&[0.0; 10], &ForecastContext::new(1))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelFitError::InsufficientHistory {
                required: 11,
                actual: 10
            }
        ));
    }

    #[test]
    fn produces_both_horizons() {
        let series: Vec<f64> = (0..60).map(|i| f64::from(i) / 30.0 - 1.0).collect();
        let out = LinearFeatureRegression::default()
            .forecast(&series, &ForecastContext::new(1))
            .unwrap();
        assert_eq!(out.short_term.len(), 24);
        assert_eq!(out.long_term.len(), 168);
        assert!(out.short_confidence >= 0.1 && out.short_confidence <= 0.9);
        assert!((out.long_confidence - out.short_confidence * 0.7).abs() < 1e-12);
    }
}
