//! Autoregressive moving-average recursion on the first difference.

use gps_deform_signal::{mean, variance};

use crate::{ForecastContext, Forecaster, MemberForecast, ModelFitError};

const MAX_LAG: usize = 10;
const SIGNIFICANT_CORRELATION: f64 = 0.1;
const MA_DECAY_STEPS: f64 = 300.0;
const STATIONARITY_MIN_LEN: usize = 10;

/// ARIMA(p, 1, q) surrogate: orders are picked from the ACF/PACF cut-offs of
/// the differenced series, with fixed coefficients `ar_i = 0.1·(i+1)` and
/// `ma_i = 0.05·(i+1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autoregressive {
    /// Upper bound on both `p` and `q`.
    pub max_order: usize,
}

impl Default for Autoregressive {
    fn default() -> Self {
        Self { max_order: 3 }
    }
}

/// Sample autocorrelation for lags `0..=max_lag`.
#[must_use]
pub fn acf(series: &[f64], max_lag: usize) -> Vec<f64> {
    let m = mean(series);
    let denominator: f64 = series.iter().map(|v| (v - m).powi(2)).sum();
    (0..=max_lag)
        .map(|lag| {
            if denominator == 0.0 || lag >= series.len() {
                return 0.0;
            }
            let numerator: f64 = series
                .iter()
                .zip(&series[lag..])
                .map(|(a, b)| (a - m) * (b - m))
                .sum();
            numerator / denominator
        })
        .collect()
}

/// Partial autocorrelation for lags `0..=max_lag` by a simplified
/// Durbin–Levinson recursion that reuses earlier partial values as the
/// prediction coefficients.
#[must_use]
pub fn pacf(series: &[f64], max_lag: usize) -> Vec<f64> {
    let r = acf(series, max_lag);
    let mut out = vec![1.0];
    for k in 1..=max_lag {
        if k == 1 {
            out.push(r[1]);
            continue;
        }
        let numerator = r[k] - (1..k).map(|j| out[j] * r[k - j]).sum::<f64>();
        let denominator = 1.0 - (1..k).map(|j| out[j] * r[j]).sum::<f64>();
        out.push(if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        });
    }
    out
}

fn cutoff(correlations: &[f64], cap: usize) -> usize {
    correlations
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, c)| c.abs() > SIGNIFICANT_CORRELATION)
        .map(|(lag, _)| lag)
        .last()
        .unwrap_or(0)
        .min(cap)
}

struct FittedModel {
    ar: Vec<f64>,
    ma: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedModel {
    fn fit(diff: &[f64], p: usize, q: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let ar: Vec<f64> = (0..p).map(|i| 0.1 * (i + 1) as f64).collect();
        #[allow(clippy::cast_precision_loss)]
        let ma: Vec<f64> = (0..q).map(|i| 0.05 * (i + 1) as f64).collect();

        let mut residuals: Vec<f64> = Vec::new();
        for t in p.max(q)..diff.len() {
            let mut fitted = 0.0;
            for (i, c) in ar.iter().enumerate() {
                fitted += c * diff[t - i - 1];
            }
            for (c, r) in ma.iter().zip(residuals.iter().rev()) {
                fitted += c * r;
            }
            residuals.push(diff[t] - fitted);
        }

        Self { ar, ma, residuals }
    }

    /// Integrates predicted differences from `last`. Future residuals are
    /// zero; `ma_decay` scales the MA term per step.
    fn project(
        &self,
        diff: &[f64],
        last: f64,
        horizon: usize,
        ma_decay: impl Fn(f64) -> f64,
    ) -> Vec<f64> {
        let order = self.ar.len().max(self.ma.len());
        let mut recent_diffs = diff[diff.len().saturating_sub(order)..].to_vec();
        let mut recent_residuals =
            self.residuals[self.residuals.len().saturating_sub(self.ma.len())..].to_vec();
        let mut current = last;

        (1..=horizon)
            .map(|step| {
                #[allow(clippy::cast_precision_loss)]
                let decay = ma_decay(step as f64);
                let ar_part: f64 = self
                    .ar
                    .iter()
                    .zip(recent_diffs.iter().rev())
                    .map(|(c, d)| c * d)
                    .sum();
                let ma_part: f64 = self
                    .ma
                    .iter()
                    .zip(recent_residuals.iter().rev())
                    .map(|(c, r)| c * r * decay)
                    .sum();
                let predicted_diff = ar_part + ma_part;
                current += predicted_diff;

                recent_diffs.push(predicted_diff);
                if recent_diffs.len() > order {
                    recent_diffs.remove(0);
                }
                recent_residuals.push(0.0);
                if recent_residuals.len() > self.ma.len() {
                    recent_residuals.remove(0);
                }
                current
            })
            .collect()
    }
}

/// Variance-ratio stationarity check: the first difference has less than
/// 80% of the series' variance.
#[must_use]
pub fn is_stationary(series: &[f64]) -> bool {
    if series.len() < STATIONARITY_MIN_LEN {
        return false;
    }
    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    variance(&diff) < variance(series) * 0.8
}

impl Forecaster for Autoregressive {
    fn name(&self) -> &'static str {
        "autoregressive"
    }

    fn forecast(
        &self,
        series: &[f64],
        ctx: &ForecastContext,
    ) -> Result<MemberForecast, ModelFitError> {
        let Some(&last) = series.last().filter(|_| series.len() >= 3) else {
            return Err(ModelFitError::InsufficientHistory {
                required: 3,
                actual: series.len(),
            });
        };

        let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        let max_lag = MAX_LAG.min(diff.len() / 4);
        let p = cutoff(&pacf(&diff, max_lag), self.max_order);
        let q = cutoff(&acf(&diff, max_lag), self.max_order);
        let model = FittedModel::fit(&diff, p, q);
        let stationary = is_stationary(series);
        log::trace!("autoregressive order p={p} q={q}, stationary={stationary}");

        let short_term = model.project(&diff, last, ctx.short_horizon, |_| 1.0);
        let long_term = model.project(&diff, last, ctx.long_horizon, |s| {
            (-s / MA_DECAY_STEPS).exp()
        });

        let (short_confidence, r2, mse, mae) = if model.residuals.is_empty() {
            (0.5, 0.0, 0.0, 0.0)
        } else {
            let total = variance(series);
            let r2 = if total == 0.0 {
                0.0
            } else {
                (1.0 - variance(&model.residuals) / total).max(0.0)
            };
            let squares: Vec<f64> = model.residuals.iter().map(|r| r * r).collect();
            let absolutes: Vec<f64> = model.residuals.iter().map(|r| r.abs()).collect();
            (r2.clamp(0.1, 0.9), r2, mean(&squares), mean(&absolutes))
        };

        Ok(MemberForecast {
            name: self.name().to_string(),
            short_term,
            long_term,
            short_confidence,
            long_confidence: short_confidence * 0.6,
            r2,
            mse,
            mae,
            degraded: false,
            stationary: Some(stationary),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acf_of_alternating_series() {
        let series = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r = acf(&series, 2);
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] + 5.0 / 6.0).abs() < 1e-12);
        assert!((r[2] - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn pacf_lag_two_uses_recursion() {
        let series = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r = acf(&series, 2);
        let p = pacf(&series, 2);
        assert!((p[1] - r[1]).abs() < 1e-12);
        let expected = (r[2] - r[1] * r[1]) / (1.0 - r[1] * r[1]);
        assert!((p[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn cutoff_picks_last_significant_lag() {
        assert_eq!(cutoff(&[1.0, 0.5, 0.05, 0.2, 0.0], 3), 3);
        assert_eq!(cutoff(&[1.0, 0.05, 0.02], 3), 0);
        assert_eq!(cutoff(&[1.0, 0.5, 0.5, 0.5, 0.5, 0.5], 3), 3);
    }

    #[test]
    fn zero_order_model_forecasts_last_value() {
        let model = FittedModel::fit(&[0.1, -0.1, 0.1], 0, 0);
        let out = model.project(&[0.1, -0.1, 0.1], 2.0, 3, |_| 1.0);
        assert_eq!(out, vec![2.0; 3]);
    }

    #[test]
    fn ar_one_integrates_decaying_differences() {
        let model = FittedModel {
            ar: vec![0.1],
            ma: Vec::new(),
            residuals: Vec::new(),
        };
        let out = model.project(&[1.0], 0.0, 3, |_| 1.0);
        let expected = [0.1, 0.11, 0.111];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn stationarity_by_variance_ratio() {
        let ramp: Vec<f64> = (0..20).map(f64::from).collect();
        assert!(is_stationary(&ramp));
        let alternating: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(!is_stationary(&alternating));
        assert!(!is_stationary(&ramp[..5]));
    }

    #[test]
    fn needs_three_samples() {
        let err = Autoregressive::default()
            .forecast(&[0.0, 1.0], &ForecastContext::new(1))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelFitError::InsufficientHistory {
                required: 3,
                actual: 2
            }
        ));
    }
}
