//! Frequency estimation from the analytic signal.
//!
//! The Hilbert transform is approximated with a truncated discrete kernel
//! of half-width [`HILBERT_HALF_WIDTH`]. That is accurate enough for the
//! short, slowly varying displacement series this crate deals with and
//! avoids an FFT dependency.

use std::f64::consts::PI;

/// Half-width of the truncated Hilbert kernel.
pub const HILBERT_HALF_WIDTH: usize = 10;

/// Truncated discrete Hilbert transform.
///
/// `h[n] = Σ x[k] / (π (n − k))` over `k ∈ [n − 10, n + 10]`, `k ≠ n`.
/// Returns all zeros for fewer than four samples.
#[must_use]
pub fn hilbert_transform(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 4 {
        return vec![0.0; n];
    }

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(HILBERT_HALF_WIDTH);
            let end = (i + HILBERT_HALF_WIDTH + 1).min(n);
            (start..end)
                .filter(|k| *k != i)
                .map(|k| {
                    #[allow(clippy::cast_precision_loss)]
                    let offset = i as f64 - k as f64;
                    signal[k] / (PI * offset)
                })
                .sum()
        })
        .collect()
}

/// Instantaneous frequency in cycles per sample between successive samples
/// of the analytic signal `x + i·h`.
#[must_use]
pub fn instantaneous_frequency(signal: &[f64], hilbert: &[f64]) -> Vec<f64> {
    let phases: Vec<f64> = signal
        .iter()
        .zip(hilbert)
        .map(|(x, h)| h.atan2(*x))
        .collect();

    phases
        .windows(2)
        .map(|pair| {
            let mut diff = pair[1] - pair[0];
            while diff > PI {
                diff -= 2.0 * PI;
            }
            while diff < -PI {
                diff += 2.0 * PI;
            }
            diff.abs() / (2.0 * PI)
        })
        .collect()
}

/// Zero-crossing rate estimate: `crossings / (2n)`.
#[must_use]
pub fn zero_crossing_frequency(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let crossings = signal
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let rate = crossings as f64 / (2.0 * signal.len() as f64);
    rate
}

/// Dominant frequency of a signal in cycles per sample.
///
/// Takes the median of the instantaneous frequencies that fall strictly
/// inside `(0, 0.5)`. Falls back to [`zero_crossing_frequency`] when none
/// do.
#[must_use]
pub fn dominant_frequency(signal: &[f64]) -> f64 {
    let hilbert = hilbert_transform(signal);
    let valid: Vec<f64> = instantaneous_frequency(signal, &hilbert)
        .into_iter()
        .filter(|f| f.is_finite() && *f > 0.0 && *f < 0.5)
        .collect();

    if valid.is_empty() {
        zero_crossing_frequency(signal)
    } else {
        crate::median(&valid)
    }
}
