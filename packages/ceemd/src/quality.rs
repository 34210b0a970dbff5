//! Decomposition quality metrics.

use gps_deform_signal::{energy, mse, pearson};
use serde::{Deserialize, Serialize};

/// SNR reported when reconstruction is exact.
pub const MAX_SNR_DB: f64 = 100.0;

/// How faithfully a decomposition reconstructs its input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionQuality {
    /// Reconstruction RMSE normalized by the RMS of the original.
    pub nrmse: f64,
    /// `1 − mean |corr|` over IMF pairs.
    pub orthogonality: f64,
    /// Reconstructed energy over original energy.
    pub energy_conservation: f64,
    /// Signal-to-noise ratio in dB, capped at 100.
    pub snr: f64,
    /// Pearson correlation of original and reconstruction.
    pub correlation: f64,
    /// Weighted overall score in `[0, 1]`.
    pub score: f64,
}

/// Sums the IMFs and the residue back into a signal.
#[must_use]
pub fn reconstruct(imfs: &[Vec<f64>], residue: &[f64]) -> Vec<f64> {
    let mut out = residue.to_vec();
    for imf in imfs {
        for (o, v) in out.iter_mut().zip(imf) {
            *o += v;
        }
    }
    out
}

fn orthogonality(imfs: &[Vec<f64>]) -> f64 {
    if imfs.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0_u32;
    for (i, a) in imfs.iter().enumerate() {
        for b in &imfs[i + 1..] {
            total += pearson(a, b).abs();
            pairs += 1;
        }
    }
    (1.0 - total / f64::from(pairs)).max(0.0)
}

/// Computes the quality metrics of a decomposition of `original`.
#[must_use]
pub fn assess(original: &[f64], imfs: &[Vec<f64>], residue: &[f64]) -> DecompositionQuality {
    let reconstructed = reconstruct(imfs, residue);
    let error = mse(original, &reconstructed);

    let original_energy = energy(original);
    #[allow(clippy::cast_precision_loss)]
    let rms = (original_energy / original.len().max(1) as f64).sqrt();
    let nrmse = if rms > 0.0 { error.sqrt() / rms } else { 0.0 };

    let energy_conservation = if original_energy == 0.0 {
        1.0
    } else {
        energy(&reconstructed) / original_energy
    };

    let snr = if error == 0.0 {
        MAX_SNR_DB
    } else {
        (10.0 * (original_energy / error).log10()).min(MAX_SNR_DB)
    };
    let snr = if snr.is_finite() { snr } else { 0.0 };

    let correlation = pearson(original, &reconstructed);
    let orthogonality = orthogonality(imfs);

    #[allow(clippy::suboptimal_flops)]
    let score = (0.3 * (1.0 - nrmse).max(0.0)
        + 0.25 * orthogonality
        + 0.2 * energy_conservation
        + 0.15 * ((snr - 10.0) / 40.0).clamp(0.0, 1.0)
        + 0.1 * correlation.max(0.0))
    .clamp(0.0, 1.0);

    DecompositionQuality {
        nrmse,
        orthogonality,
        energy_conservation,
        snr,
        correlation,
        score,
    }
}
