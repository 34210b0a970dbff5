#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]
#![allow(clippy::cast_precision_loss)]

//! Numeric helpers shared by the deformation analysis stages.
//!
//! Every statistic here uses the population form (divide by `n`) and
//! returns `0.0` for empty input instead of `NaN`, so downstream stages
//! never have to special-case empty slices.
//!
//! The [`SeededRng`] type provides the deterministic random streams used by
//! CEEMD noise, bootstrap patterns and forecast jitter. There is no global
//! generator: each consumer derives its own stream from a device seed.

pub mod spectral;

// ── Descriptive statistics ──────────────────────────────────────────

/// Arithmetic mean, `0.0` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance, `0.0` for an empty slice.
#[must_use]
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Median of the values (mean of the two middle values for even lengths).
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Largest absolute value, `0.0` for an empty slice.
#[must_use]
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Sum of squares.
#[must_use]
pub fn energy(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

// ── Regression and comparison ───────────────────────────────────────

/// Least-squares slope of the values against their sample index.
///
/// Returns `0.0` when fewer than two values are given.
#[must_use]
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

/// Pearson correlation over the common prefix of both slices.
///
/// Returns `0.0` when either side has no variance.
#[must_use]
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let den = (va * vb).sqrt();
    if den == 0.0 { 0.0 } else { cov / den }
}

/// Mean squared error over the common prefix.
#[must_use]
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n as f64
}

/// Mean absolute error over the common prefix.
#[must_use]
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n as f64
}

/// Coefficient of determination `1 − SS_res/SS_tot`.
///
/// Returns `0.0` when the actual values have no variance. The result may be
/// negative for predictions worse than the mean.
#[must_use]
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let actual = &actual[..n];
    let m = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

// ── Deterministic random streams ────────────────────────────────────

const LCG_MULTIPLIER: u32 = 1_664_525;
const LCG_INCREMENT: u32 = 1_013_904_223;
const LCG_MODULUS: f64 = 4_294_967_296.0;
const DEVICE_SEED_START: u64 = 12_345;
const DEVICE_SEED_MODULUS: u64 = 2_147_483_647;

/// Linear congruential generator with an optional cached Gaussian spare.
///
/// `state = state · 1664525 + 1013904223 (mod 2³²)` and each draw returns
/// `state / 2³²` in `[0, 1)`. Streams are reproducible from the device
/// seed across deployments of the monitoring backend, so the recurrence is
/// fixed rather than delegated to a general-purpose generator.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u32,
    spare: Option<f64>,
}

impl SeededRng {
    /// Creates a generator from a raw seed.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self {
            state: seed,
            spare: None,
        }
    }

    /// Derives the base seed for a device id.
    ///
    /// Starts at 12345 and folds each character in with
    /// `seed = (seed · 31 + char) mod 2147483647`.
    #[must_use]
    pub fn device_seed(device_id: &str) -> u32 {
        let seed = device_id.chars().fold(DEVICE_SEED_START, |seed, c| {
            (seed * 31 + u64::from(c)) % DEVICE_SEED_MODULUS
        });
        // Always below 2^31 after the modulus.
        u32::try_from(seed).unwrap_or(u32::MAX)
    }

    /// Creates the generator for a device id.
    #[must_use]
    pub fn for_device(device_id: &str) -> Self {
        Self::new(Self::device_seed(device_id))
    }

    /// Derives an independent stream for a numbered sub-task (a CEEMD
    /// realization, a forecast member) from a base seed.
    #[must_use]
    pub const fn stream(seed: u32, index: u32) -> Self {
        let mixed = index.wrapping_add(1).wrapping_mul(0x9E37_79B9);
        Self::new(seed ^ (mixed ^ (mixed >> 16)))
    }

    /// Next uniform value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        f64::from(self.state) / LCG_MODULUS
    }

    /// Next standard-normal value using the Box–Muller transform.
    ///
    /// Each transform yields two values; the second is cached and returned
    /// by the following call.
    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }
        let mut u1 = self.next_f64();
        while u1 <= f64::MIN_POSITIVE {
            u1 = self.next_f64();
        }
        let u2 = self.next_f64();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        self.spare = Some(radius * theta.sin());
        radius * theta.cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn statistics_of_empty_slice_are_zero() {
        assert!(mean(&[]).abs() < EPS);
        assert!(std_dev(&[]).abs() < EPS);
        assert!(median(&[]).abs() < EPS);
        assert!(linear_slope(&[1.0]).abs() < EPS);
    }

    #[test]
    fn population_std_of_known_series() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < EPS);
        assert!((std_dev(&values) - 2.0).abs() < EPS);
        assert!((median(&values) - 4.5).abs() < EPS);
    }

    #[test]
    fn slope_of_linear_series() {
        let values: Vec<f64> = (0..10).map(|i| 0.5f64.mul_add(f64::from(i), 3.0)).collect();
        assert!((linear_slope(&values) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn pearson_handles_constant_and_perfect_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b) - 1.0).abs() < EPS);
        assert!(pearson(&a, &[1.0; 4]).abs() < EPS);
    }

    #[test]
    fn r_squared_is_one_for_perfect_prediction() {
        let a = [1.0, 3.0, 2.0, 5.0];
        assert!((r_squared(&a, &a) - 1.0).abs() < EPS);
        assert!(r_squared(&a, &[10.0; 4]) < 0.0);
        assert!((mse(&a, &a)).abs() < EPS);
        assert!((mae(&[1.0, 2.0], &[2.0, 4.0]) - 1.5).abs() < EPS);
    }

    #[test]
    fn lcg_matches_reference_sequence() {
        let mut rng = SeededRng::new(0);
        let first = rng.next_f64();
        assert!((first - 1_013_904_223.0 / 4_294_967_296.0).abs() < EPS);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn device_seed_is_deterministic() {
        assert_eq!(SeededRng::device_seed(""), 12_345);
        assert_eq!(SeededRng::device_seed("a"), 12_345 * 31 + 97);
        let mut a = SeededRng::for_device("sensor-7");
        let mut b = SeededRng::for_device("sensor-7");
        for _ in 0..10 {
            assert!((a.next_f64() - b.next_f64()).abs() < EPS);
        }
    }

    #[test]
    fn uniform_draws_follow_the_lcg_recurrence() {
        let mut rng = SeededRng::new(12_345);
        for expected in [87_628_868_u32, 71_072_467, 2_332_836_374] {
            let draw = rng.next_f64();
            assert!((draw - f64::from(expected) / 4_294_967_296.0).abs() < EPS);
        }
    }

    #[test]
    fn streams_differ_per_index() {
        let mut a = SeededRng::stream(42, 0);
        let mut b = SeededRng::stream(42, 1);
        assert!((a.next_f64() - b.next_f64()).abs() > EPS);
    }

    #[test]
    fn gaussian_has_unit_scale() {
        let mut rng = SeededRng::new(7);
        let samples: Vec<f64> = (0..20_000).map(|_| rng.next_gaussian()).collect();
        assert!(mean(&samples).abs() < 0.05);
        assert!((std_dev(&samples) - 1.0).abs() < 0.05);
    }
}
