//! Recency-weighted trend extrapolation.

use std::collections::VecDeque;

use gps_deform_signal::{linear_slope, mae, mean, mse, r_squared};

use crate::{ForecastContext, Forecaster, MemberForecast, ModelFitError, split_point};

/// Continues the exponentially weighted mean of the last `window` samples
/// along their local slope, nudged by the average slope seen in training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWeightedTrend {
    pub window: usize,
}

impl Default for RecencyWeightedTrend {
    fn default() -> Self {
        Self { window: 30 }
    }
}

/// Mean weighted by `exp(idx / len)`, favouring recent samples.
fn weighted_mean<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let len = values.len().max(1) as f64;
    let (sum, weights) = values.enumerate().fold((0.0, 0.0), |(sum, weights), (i, v)| {
        #[allow(clippy::cast_precision_loss)]
        let w = (i as f64 / len).exp();
        (w.mul_add(*v, sum), weights + w)
    });
    if weights == 0.0 { 0.0 } else { sum / weights }
}

fn deque_slope(window: &VecDeque<f64>) -> f64 {
    linear_slope(&window.iter().copied().collect::<Vec<_>>())
}

impl Forecaster for RecencyWeightedTrend {
    fn name(&self) -> &'static str {
        "recency_weighted_trend"
    }

    fn forecast(
        &self,
        series: &[f64],
        ctx: &ForecastContext,
    ) -> Result<MemberForecast, ModelFitError> {
        if series.len() < 2 {
            return Err(ModelFitError::InsufficientHistory {
                required: 2,
                actual: series.len(),
            });
        }

        let samples: Vec<(&[f64], f64)> = (self.window..series.len())
            .map(|i| (&series[i - self.window..i], series[i]))
            .collect();
        let split = split_point(samples.len(), ctx.validation_split);
        let (train, test) = samples.split_at(split);

        let training_slopes: Vec<f64> = train.iter().map(|(x, _)| linear_slope(x)).collect();
        let avg_trend = mean(&training_slopes);

        let tail: VecDeque<f64> = series[series.len().saturating_sub(self.window)..]
            .iter()
            .copied()
            .collect();

        let mut window = tail.clone();
        let short_term = (1..=ctx.short_horizon)
            .map(|step| {
                #[allow(clippy::cast_precision_loss)]
                let s = step as f64;
                let prediction = weighted_mean(window.iter())
                    + deque_slope(&window) * s
                    + avg_trend * s * 0.1;
                window.pop_front();
                window.push_back(prediction);
                prediction
            })
            .collect();

        let mut rng = ctx.rng.clone();
        let mut window = tail;
        let long_term = (1..=ctx.long_horizon)
            .map(|step| {
                #[allow(clippy::cast_precision_loss)]
                let s = step as f64;
                let decay = (-s / 500.0).exp();
                let jitter = (rng.next_f64() - 0.5) * 0.001 * s.sqrt();
                let prediction = weighted_mean(window.iter())
                    + deque_slope(&window) * s * decay
                    + avg_trend * s * 0.1
                    + jitter;
                window.pop_front();
                window.push_back(prediction);
                prediction
            })
            .collect();

        let (short_confidence, r2, mse, mae) = if test.is_empty() {
            (0.7, 0.0, 0.0, 0.0)
        } else {
            let actual: Vec<f64> = test.iter().map(|(_, y)| *y).collect();
            let predicted: Vec<f64> = test
                .iter()
                .map(|(x, _)| weighted_mean(x.iter()) + linear_slope(x) + avg_trend * 0.1)
                .collect();
            let r2 = r_squared(&actual, &predicted);
            (
                r2.clamp(0.1, 0.95),
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
            long_confidence: short_confidence * 0.8,
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

    fn ramp(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64;
                t * 0.1
            })
            .collect()
    }

    #[test]
    fn weighted_mean_favours_recent_values() {
        let values = [0.0, 1.0];
        let m = weighted_mean(values.iter());
        let expected = 0.5f64.exp() / (1.0 + 0.5f64.exp());
        assert!((m - expected).abs() < 1e-12);
        assert!(m > 0.5);
    }

    #[test]
    fn rising_series_keeps_rising() {
        let series = ramp(80);
        let out = RecencyWeightedTrend::default()
            .forecast(&series, &ForecastContext::new(7))
            .unwrap();
        assert_eq!(out.short_term.len(), 24);
        assert_eq!(out.long_term.len(), 168);
        assert!(out.short_term[23] > series[79]);
        assert!(out.short_term.windows(2).all(|w| w[1] > w[0]));
        assert!(out.long_confidence <= out.short_confidence);
    }

    #[test]
    fn short_history_without_windows_uses_default_confidence() {
        let out = RecencyWeightedTrend::default()
            .forecast(&ramp(10), &ForecastContext::new(7))
            .unwrap();
        assert!((out.short_confidence - 0.7).abs() < f64::EPSILON);
        assert!(out.r2.abs() < f64::EPSILON);
    }

    #[test]
    fn needs_two_samples() {
        let err = RecencyWeightedTrend::default()
            .forecast(&[1.0], &ForecastContext::new(7))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelFitError::InsufficientHistory {
                required: 2,
                actual: 1
            }
        ));
    }
}
