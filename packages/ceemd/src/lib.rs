#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Complete ensemble empirical mode decomposition (CEEMD).
//!
//! Each realization adds a seeded Gaussian noise vector to the signal and
//! subtracts the same vector from a second copy, decomposes both with EMD
//! and averages the pair. The ensemble average over all realizations gives
//! the final IMFs, and the residue is whatever the kept IMFs do not
//! explain, so `Σ IMFs + residue` always reconstructs the input.
//!
//! [`decompose_concurrent`] splits the realizations into chunks that run on
//! the blocking thread pool; [`decompose`] runs them inline.

pub mod emd;
pub mod extrema;
pub mod quality;

use std::sync::Arc;

use gps_deform_models::CancelFlag;
use gps_deform_signal::{SeededRng, energy, max_abs, spectral::dominant_frequency, std_dev};
use serde::{Deserialize, Serialize};

pub use quality::DecompositionQuality;

/// Shortest signal that can be decomposed.
pub const MIN_SIGNAL_LEN: usize = 4;

const ZERO_IMF_MAX_ABS: f64 = 1e-10;

/// Errors from decomposition.
#[derive(Debug, thiserror::Error)]
pub enum DecompositionError {
    /// Sifting hit the iteration cap without meeting a stop criterion.
    #[error("Sifting did not converge within {iterations} iterations")]
    NotConverged {
        /// The configured iteration cap.
        iterations: usize,
    },

    /// The caller cancelled the run.
    #[error("Decomposition cancelled")]
    Cancelled,

    /// The signal is too short to decompose.
    #[error("Signal too short for decomposition: {len} samples")]
    SignalTooShort {
        /// Length of the rejected signal.
        len: usize,
    },

    /// A worker task panicked or was aborted.
    #[error("Decomposition worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

/// CEEMD parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CeemdConfig {
    /// Noise amplitude as a fraction of the signal standard deviation.
    pub noise_std: f64,
    /// Number of ± noise realizations.
    pub ensemble_size: usize,
    /// Maximum number of IMFs kept.
    pub max_imfs: usize,
    /// SD stop criterion for sifting.
    pub sd_threshold: f64,
    /// Relative energy change stop criterion for sifting.
    pub energy_change_threshold: f64,
    /// Correlation stop criterion for sifting.
    pub correlation_threshold: f64,
    /// Minimum maxima and minima needed to keep sifting.
    pub min_extrema: usize,
    /// Lower bound of the dynamic extrema threshold.
    pub extrema_threshold: f64,
    /// Iteration cap for a single sifting run.
    pub max_sift_iterations: usize,
    /// Number of concurrent realization chunks.
    pub workers: usize,
}

impl Default for CeemdConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.1,
            ensemble_size: 50,
            max_imfs: 8,
            sd_threshold: 0.2,
            energy_change_threshold: 0.2,
            correlation_threshold: 0.9,
            min_extrema: 3,
            extrema_threshold: 0.001,
            max_sift_iterations: 1000,
            workers: 4,
        }
    }
}

/// Summary of one IMF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImfAnalysis {
    /// Position of the IMF, 0 being the highest frequency.
    pub index: usize,
    /// Sum of squares.
    pub energy: f64,
    /// Dominant frequency in cycles per sample.
    pub dominant_frequency: f64,
    /// Largest absolute value.
    pub amplitude: f64,
}

/// Result of a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decomposition {
    /// Intrinsic mode functions, highest frequency first.
    pub imfs: Vec<Vec<f64>>,
    /// Signal minus the sum of the IMFs.
    pub residue: Vec<f64>,
    /// Per-IMF summary.
    pub imf_analysis: Vec<ImfAnalysis>,
    /// Reconstruction quality.
    pub quality: DecompositionQuality,
    /// Number of realizations averaged.
    pub realizations: usize,
    /// `true` if this is the single-IMF fallback.
    pub degraded: bool,
}

impl Decomposition {
    /// The fallback decomposition: one IMF equal to the signal and a zero
    /// residue.
    #[must_use]
    pub fn degraded(signal: &[f64]) -> Self {
        let imfs = vec![signal.to_vec()];
        let residue = vec![0.0; signal.len()];
        Self {
            imf_analysis: analyze_imfs(&imfs),
            quality: quality::assess(signal, &imfs, &residue),
            imfs,
            residue,
            realizations: 0,
            degraded: true,
        }
    }

    /// Sum of the IMFs and the residue.
    #[must_use]
    pub fn reconstruct(&self) -> Vec<f64> {
        quality::reconstruct(&self.imfs, &self.residue)
    }
}

/// IMFs of one realization, after averaging its ± pair.
type RealizationImfs = Vec<Vec<f64>>;

fn analyze_imfs(imfs: &[Vec<f64>]) -> Vec<ImfAnalysis> {
    imfs.iter()
        .enumerate()
        .map(|(index, imf)| ImfAnalysis {
            index,
            energy: energy(imf),
            dominant_frequency: dominant_frequency(imf),
            amplitude: max_abs(imf),
        })
        .collect()
}

fn run_realization(
    signal: &[f64],
    amplitude: f64,
    config: &CeemdConfig,
    seed: u32,
    realization: usize,
) -> Result<RealizationImfs, DecompositionError> {
    let index = u32::try_from(realization).unwrap_or(u32::MAX);
    let mut rng = SeededRng::stream(seed, index);
    let noise: Vec<f64> = signal
        .iter()
        .map(|_| rng.next_gaussian() * amplitude)
        .collect();

    let plus: Vec<f64> = signal.iter().zip(&noise).map(|(s, n)| s + n).collect();
    let minus: Vec<f64> = signal.iter().zip(&noise).map(|(s, n)| s - n).collect();
    let plus = emd::emd(&plus, config)?;
    let minus = emd::emd(&minus, config)?;

    let zeros = vec![0.0; signal.len()];
    let pairs = plus.len().max(minus.len());
    Ok((0..pairs)
        .map(|i| {
            let p = plus.get(i).unwrap_or(&zeros);
            let m = minus.get(i).unwrap_or(&zeros);
            p.iter().zip(m).map(|(a, b)| f64::midpoint(*a, *b)).collect()
        })
        .collect())
}

fn run_chunk(
    signal: &[f64],
    amplitude: f64,
    config: &CeemdConfig,
    seed: u32,
    realizations: std::ops::Range<usize>,
    cancel: &CancelFlag,
) -> Result<Vec<RealizationImfs>, DecompositionError> {
    realizations
        .map(|r| {
            if cancel.is_cancelled() {
                return Err(DecompositionError::Cancelled);
            }
            run_realization(signal, amplitude, config, seed, r)
        })
        .collect()
}

fn combine(signal: &[f64], ensemble: &[RealizationImfs], config: &CeemdConfig) -> Decomposition {
    let n = signal.len();
    let count = ensemble
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .min(config.max_imfs);

    let imfs: Vec<Vec<f64>> = (0..count)
        .filter_map(|k| {
            let members: Vec<&Vec<f64>> = ensemble.iter().filter_map(|imfs| imfs.get(k)).collect();
            if members.is_empty() {
                return None;
            }
            let mut avg = vec![0.0; n];
            for imf in &members {
                for (a, v) in avg.iter_mut().zip(imf.iter()) {
                    *a += v;
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let len = members.len() as f64;
            for a in &mut avg {
                *a /= len;
            }
            Some(avg)
        })
        .filter(|imf| max_abs(imf) > ZERO_IMF_MAX_ABS)
        .collect();

    let mut residue = signal.to_vec();
    for imf in &imfs {
        for (r, v) in residue.iter_mut().zip(imf) {
            *r -= v;
        }
    }

    Decomposition {
        imf_analysis: analyze_imfs(&imfs),
        quality: quality::assess(signal, &imfs, &residue),
        imfs,
        residue,
        realizations: ensemble.len(),
        degraded: false,
    }
}

const fn check_length(signal: &[f64]) -> Result<(), DecompositionError> {
    if signal.len() < MIN_SIGNAL_LEN {
        return Err(DecompositionError::SignalTooShort { len: signal.len() });
    }
    Ok(())
}

/// Decomposes `signal` on the current thread.
///
/// # Errors
///
/// Returns [`DecompositionError::SignalTooShort`] for signals shorter than
/// four samples, [`DecompositionError::Cancelled`] if `cancel` fires between
/// realizations, or [`DecompositionError::NotConverged`] if sifting fails to
/// converge.
pub fn decompose(
    signal: &[f64],
    config: &CeemdConfig,
    seed: u32,
    cancel: &CancelFlag,
) -> Result<Decomposition, DecompositionError> {
    check_length(signal)?;
    let amplitude = config.noise_std * std_dev(signal);
    let ensemble = run_chunk(signal, amplitude, config, seed, 0..config.ensemble_size, cancel)?;
    Ok(combine(signal, &ensemble, config))
}

/// Decomposes `signal` with realizations split across `config.workers`
/// blocking tasks.
///
/// Produces the same result as [`decompose`] for the same seed.
///
/// # Errors
///
/// Same as [`decompose`], plus [`DecompositionError::Worker`] if a worker
/// task panics.
pub async fn decompose_concurrent(
    signal: Vec<f64>,
    config: CeemdConfig,
    seed: u32,
    cancel: CancelFlag,
) -> Result<Decomposition, DecompositionError> {
    check_length(&signal)?;
    let amplitude = config.noise_std * std_dev(&signal);
    let signal: Arc<[f64]> = signal.into();
    let config = Arc::new(config);

    let workers = config.workers.max(1);
    let chunk = config.ensemble_size.div_ceil(workers).max(1);

    let handles = (0..config.ensemble_size).step_by(chunk).map(|start| {
        let end = (start + chunk).min(config.ensemble_size);
        let signal = Arc::clone(&signal);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            run_chunk(&signal, amplitude, &config, seed, start..end, &cancel)
        })
    });

    let mut ensemble = Vec::with_capacity(config.ensemble_size);
    for joined in futures::future::join_all(handles).await {
        let chunk = joined.map_err(|e| DecompositionError::Worker {
            message: e.to_string(),
        })??;
        ensemble.extend(chunk);
    }

    log::debug!(
        "CEEMD combined {} realizations of {} samples",
        ensemble.len(),
        signal.len()
    );
    Ok(combine(&signal, &ensemble, &config))
}

/// Runs [`decompose_concurrent`] and falls back to
/// [`Decomposition::degraded`] on any failure except cancellation.
///
/// # Errors
///
/// Returns [`DecompositionError::Cancelled`] if the run was cancelled.
pub async fn decompose_or_degrade(
    signal: Vec<f64>,
    config: CeemdConfig,
    seed: u32,
    cancel: CancelFlag,
) -> Result<Decomposition, DecompositionError> {
    let fallback = signal.clone();
    match decompose_concurrent(signal, config, seed, cancel).await {
        Ok(decomposition) => Ok(decomposition),
        Err(DecompositionError::Cancelled) => Err(DecompositionError::Cancelled),
        Err(e) => {
            log::warn!("CEEMD degraded to single-IMF fallback: {e}");
            Ok(Decomposition::degraded(&fallback))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn signal() -> Vec<f64> {
        (0..120)
            .map(|i| {
                let t = f64::from(i);
                0.002f64.mul_add((2.0 * PI * t / 12.0).sin(), 0.0005 * t)
            })
            .collect()
    }

    fn small_config() -> CeemdConfig {
        CeemdConfig {
            ensemble_size: 6,
            workers: 3,
            ..CeemdConfig::default()
        }
    }

    #[test]
    fn reconstruction_is_exact() {
        let input = signal();
        let result = decompose(&input, &small_config(), 12_345, &CancelFlag::new()).unwrap();
        assert!(!result.degraded);
        assert_eq!(result.realizations, 6);
        assert_eq!(result.imf_analysis.len(), result.imfs.len());
        let scale = input.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        for (a, b) in input.iter().zip(result.reconstruct()) {
            assert!((a - b).abs() <= 1e-6 * scale);
        }
    }

    #[test]
    fn short_signal_is_rejected() {
        let err = decompose(&[1.0, 2.0, 3.0], &small_config(), 1, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, DecompositionError::SignalTooShort { len: 3 }));
    }

    #[test]
    fn cancelled_flag_stops_decomposition() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = decompose(&signal(), &small_config(), 1, &cancel).unwrap_err();
        assert!(matches!(err, DecompositionError::Cancelled));
    }

    #[test]
    fn degraded_fallback_keeps_signal_as_single_imf() {
        let input = signal();
        let result = Decomposition::degraded(&input);
        assert!(result.degraded);
        assert_eq!(result.imfs, vec![input.clone()]);
        assert!(result.residue.iter().all(|v| *v == 0.0));
        assert_eq!(result.reconstruct(), input);
    }

    #[tokio::test]
    async fn concurrent_matches_sequential() {
        let input = signal();
        let sequential = decompose(&input, &small_config(), 99, &CancelFlag::new()).unwrap();
        let concurrent = decompose_concurrent(input, small_config(), 99, CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn capped_sifting_degrades() {
        let config = CeemdConfig {
            max_sift_iterations: 0,
            ..small_config()
        };
        let input = signal();
        let result = decompose_or_degrade(input.clone(), config, 7, CancelFlag::new())
            .await
            .unwrap();
        assert!(result.degraded);
        assert_eq!(result.imfs.len(), 1);
        assert_eq!(result.imfs[0], input);
    }

    #[tokio::test]
    async fn cancellation_is_not_degraded() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = decompose_or_degrade(signal(), small_config(), 7, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DecompositionError::Cancelled));
    }
}
