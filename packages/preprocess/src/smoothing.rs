//! Confidence-adaptive smoothing.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

const GAUSSIAN_KERNEL_HALF_WIDTH: isize = 2;
const GAUSSIAN_SIGMA: f64 = 1.0;
const KALMAN_PROCESS_NOISE: f64 = 0.01;
const KALMAN_MEASUREMENT_NOISE: f64 = 0.1;

/// Smoothing filter applied to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SmoothingMethod {
    /// Too few points to smooth.
    None,
    /// Window-3 moving average.
    MovingAverage,
    /// Size-5 Gaussian kernel with σ = 1.
    Gaussian,
    /// Scalar Kalman filter.
    Kalman,
}

impl SmoothingMethod {
    /// Picks the filter for a series with the given mean confidence.
    #[must_use]
    pub fn for_confidence(mean_confidence: f64) -> Self {
        if mean_confidence >= 0.8 {
            Self::MovingAverage
        } else if mean_confidence >= 0.6 {
            Self::Gaussian
        } else {
            Self::Kalman
        }
    }

    /// Applies the filter.
    #[must_use]
    pub fn apply(self, values: &[f64]) -> Vec<f64> {
        match self {
            Self::None => values.to_vec(),
            Self::MovingAverage => moving_average(values),
            Self::Gaussian => gaussian(values),
            Self::Kalman => kalman(values),
        }
    }
}

/// Centered window-3 moving average, truncated at the edges.
#[must_use]
pub fn moving_average(values: &[f64]) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let window = &values[i.saturating_sub(1)..(i + 2).min(values.len())];
            #[allow(clippy::cast_precision_loss)]
            let len = window.len() as f64;
            window.iter().sum::<f64>() / len
        })
        .collect()
}

/// Size-5 Gaussian kernel, renormalized where it overhangs the edges.
#[must_use]
pub fn gaussian(values: &[f64]) -> Vec<f64> {
    let len = isize::try_from(values.len()).unwrap_or(isize::MAX);
    (0..len)
        .map(|i| {
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for k in -GAUSSIAN_KERNEL_HALF_WIDTH..=GAUSSIAN_KERNEL_HALF_WIDTH {
                let j = i + k;
                if j < 0 || j >= len {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let offset = k as f64;
                let weight = (-(offset * offset) / (2.0 * GAUSSIAN_SIGMA * GAUSSIAN_SIGMA)).exp();
                #[allow(clippy::cast_sign_loss)]
                let value = values[j as usize];
                sum += weight * value;
                weight_sum += weight;
            }
            sum / weight_sum
        })
        .collect()
}

/// Scalar Kalman filter with `Q = 0.01`, `R = 0.1`, starting from the first
/// value with `P = 1`. The first output equals the first input.
#[must_use]
pub fn kalman(values: &[f64]) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let mut estimate = first;
    let mut error = 1.0;
    let mut out = Vec::with_capacity(values.len());
    out.push(first);
    for z in &values[1..] {
        error += KALMAN_PROCESS_NOISE;
        let gain = error / (error + KALMAN_MEASUREMENT_NOISE);
        estimate += gain * (z - estimate);
        error *= 1.0 - gain;
        out.push(estimate);
    }
    out
}
