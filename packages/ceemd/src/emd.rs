//! Sifting and empirical mode decomposition of a single realization.

use gps_deform_signal::{energy, max_abs, pearson};

use crate::extrema::{envelope, find_extrema};
use crate::{CeemdConfig, DecompositionError};

const ZERO_IMF_MAX_ABS: f64 = 1e-10;
const NEGLIGIBLE_ENERGY_RATIO: f64 = 1e-4;
const NEGLIGIBLE_MEAN_ABS: f64 = 1e-6;
const MIN_IMF_EXTREMA: usize = 2;

/// Returns `true` if the signal never changes direction.
#[must_use]
pub fn is_monotonic(signal: &[f64]) -> bool {
    let mut increasing = true;
    let mut decreasing = true;
    for pair in signal.windows(2) {
        if pair[1] > pair[0] {
            decreasing = false;
        }
        if pair[1] < pair[0] {
            increasing = false;
        }
    }
    increasing || decreasing
}

/// Sifts one intrinsic mode function out of `signal`.
///
/// Each pass subtracts the mean of the upper and lower envelopes. Sifting
/// stops as soon as any of the SD, energy-change or correlation criteria
/// holds, or returns the current iterate when there are too few extrema to
/// build envelopes.
///
/// # Errors
///
/// Returns [`DecompositionError::NotConverged`] if no criterion is met
/// within `max_sift_iterations` passes.
pub fn sift(signal: &[f64], config: &CeemdConfig) -> Result<Vec<f64>, DecompositionError> {
    let mut h = signal.to_vec();

    for _ in 0..config.max_sift_iterations {
        let extrema = find_extrema(&h, config.extrema_threshold, config.min_extrema);
        if !extrema.has_at_least(config.min_extrema) {
            return Ok(h);
        }

        let upper = envelope(&extrema.maxima, h.len());
        let lower = envelope(&extrema.minima, h.len());
        let next: Vec<f64> = h
            .iter()
            .zip(upper.iter().zip(&lower))
            .map(|(x, (u, l))| x - f64::midpoint(*u, *l))
            .collect();

        if should_stop(&next, &h, config) {
            return Ok(next);
        }
        h = next;
    }

    Err(DecompositionError::NotConverged {
        iterations: config.max_sift_iterations,
    })
}

fn should_stop(next: &[f64], previous: &[f64], config: &CeemdConfig) -> bool {
    #[allow(clippy::cast_precision_loss)]
    let sd = (next
        .iter()
        .zip(previous)
        .map(|(n, o)| ((n - o) / o.abs().max(1e-10)).powi(2))
        .sum::<f64>()
        / next.len().max(1) as f64)
        .sqrt();

    let old_energy = energy(previous);
    let energy_change = if old_energy == 0.0 {
        0.0
    } else {
        (energy(next) - old_energy).abs() / old_energy
    };

    sd < config.sd_threshold
        || energy_change < config.energy_change_threshold
        || pearson(next, previous) > config.correlation_threshold
}

/// Decomposes one signal into up to `max_imfs` IMFs.
///
/// Decomposition stops at a candidate that is numerically zero or carries
/// negligible energy and amplitude, at a candidate with fewer than two
/// maxima or minima, or when the residue becomes monotonic after at least
/// two IMFs.
///
/// # Errors
///
/// Propagates [`DecompositionError::NotConverged`] from [`sift`].
pub fn emd(signal: &[f64], config: &CeemdConfig) -> Result<Vec<Vec<f64>>, DecompositionError> {
    let mut imfs = Vec::new();
    let mut residue = signal.to_vec();

    for _ in 0..config.max_imfs {
        let imf = sift(&residue, config)?;

        let imf_energy = energy(&imf);
        let residue_energy = energy(&residue);
        let energy_ratio = if residue_energy > 0.0 {
            imf_energy / residue_energy
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let mean_abs = imf.iter().map(|v| v.abs()).sum::<f64>() / imf.len().max(1) as f64;

        // The residue is unchanged, so sifting it again yields the same
        // candidate.
        if max_abs(&imf) < ZERO_IMF_MAX_ABS
            || (energy_ratio < NEGLIGIBLE_ENERGY_RATIO && mean_abs < NEGLIGIBLE_MEAN_ABS)
        {
            break;
        }

        let extrema = find_extrema(&imf, config.extrema_threshold, config.min_extrema);
        if !extrema.has_at_least(MIN_IMF_EXTREMA) {
            break;
        }

        for (r, v) in residue.iter_mut().zip(&imf) {
            *r -= v;
        }
        imfs.push(imf);

        if imfs.len() >= 2 && is_monotonic(&residue) {
            break;
        }
    }

    Ok(imfs)
}
