//! Majority-vote outlier rejection.
//!
//! Three independent detectors each flag suspicious samples. A sample is
//! removed only when at least two detectors agree.

use gps_deform_models::DisplacementPoint;
use gps_deform_signal::{mean, std_dev};
use serde::{Deserialize, Serialize};

/// Votes needed to remove a point.
const MAJORITY: usize = 2;

/// How many points each detector flagged, and how many were removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierReport {
    /// Points flagged by the 3σ rule.
    pub sigma: usize,
    /// Points flagged by the Tukey IQR fence.
    pub iqr: usize,
    /// Points flagged by the velocity rule.
    pub velocity: usize,
    /// Points removed by majority vote.
    pub removed: usize,
}

/// Flags `|x − μ| > k·σ` using the population standard deviation.
#[must_use]
pub fn sigma_flags(values: &[f64], k: f64) -> Vec<bool> {
    let m = mean(values);
    let s = std_dev(values);
    values.iter().map(|v| (v - m).abs() > k * s).collect()
}

/// Flags values outside the Tukey fence `[q1 − k·IQR, q3 + k·IQR]`.
///
/// Quartiles are taken as `sorted[floor(n·0.25)]` and `sorted[floor(n·0.75)]`.
#[must_use]
pub fn iqr_flags(values: &[f64], k: f64) -> Vec<bool> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(n * 3 / 4).min(n - 1)];
    let iqr = q3 - q1;
    let (lower, upper) = (k.mul_add(-iqr, q1), k.mul_add(iqr, q3));
    values.iter().map(|v| *v < lower || *v > upper).collect()
}

/// Flags points whose rate of change exceeds `mean(v) + k·std(v)`.
///
/// `v_i = |x_i − x_{i−1}| / Δhours`, with `v = 0` when time does not
/// advance. The first point is never flagged and the detector flags
/// nothing for fewer than three points.
#[must_use]
pub fn velocity_flags(points: &[DisplacementPoint], k: f64) -> Vec<bool> {
    let mut flags = vec![false; points.len()];
    if points.len() < 3 {
        return flags;
    }

    let velocities: Vec<f64> = points
        .windows(2)
        .map(|pair| {
            #[allow(clippy::cast_precision_loss)]
            let hours =
                (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 3_600_000.0;
            if hours <= 0.0 {
                0.0
            } else {
                (pair[1].distance_3d - pair[0].distance_3d).abs() / hours
            }
        })
        .collect();

    let limit = k.mul_add(std_dev(&velocities), mean(&velocities));
    for (i, v) in velocities.iter().enumerate() {
        if *v > limit {
            flags[i + 1] = true;
        }
    }
    flags
}

/// Removes points flagged by at least two of the three detectors.
#[must_use]
pub fn reject_outliers(
    points: Vec<DisplacementPoint>,
    sigma_k: f64,
    iqr_k: f64,
) -> (Vec<DisplacementPoint>, OutlierReport) {
    let values: Vec<f64> = points.iter().map(|p| p.distance_3d).collect();
    let sigma = sigma_flags(&values, sigma_k);
    let iqr = iqr_flags(&values, iqr_k);
    let velocity = velocity_flags(&points, sigma_k);

    let mut report = OutlierReport {
        sigma: sigma.iter().filter(|f| **f).count(),
        iqr: iqr.iter().filter(|f| **f).count(),
        velocity: velocity.iter().filter(|f| **f).count(),
        removed: 0,
    };

    let kept: Vec<DisplacementPoint> = points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            let votes = usize::from(sigma[*i]) + usize::from(iqr[*i]) + usize::from(velocity[*i]);
            votes < MAJORITY
        })
        .map(|(_, p)| p)
        .collect();

    report.removed = values.len() - kept.len();
    (kept, report)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn series(values: &[f64]) -> Vec<DisplacementPoint> {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DisplacementPoint {
                timestamp: start + Duration::hours(i64::try_from(i).unwrap()),
                latitude: 0.0,
                longitude: 0.0,
                horizontal: *v,
                vertical: 0.0,
                distance_3d: *v,
                bearing: 90.0,
                confidence: 0.9,
                measurement_error: 0.005,
                interpolated: false,
            })
            .collect()
    }

    #[test]
    fn iqr_uses_floor_index_quartiles() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0];
        // q1 = sorted[2] = 3, q3 = sorted[6] = 7, fence [-3, 13]
        let flags = iqr_flags(&values, 1.5);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert!(flags[7]);
    }

    #[test]
    fn velocity_never_flags_first_point() {
        let mut values = vec![0.01; 20];
        values[0] = 5.0;
        let flags = velocity_flags(&series(&values), 3.0);
        assert!(!flags[0]);
    }

    #[test]
    fn velocity_skipped_for_short_series() {
        assert_eq!(velocity_flags(&series(&[0.0, 9.0]), 3.0), vec![false, false]);
    }

    #[test]
    fn spike_flagged_by_all_detectors_is_removed() {
        let mut values: Vec<f64> = (0..30).map(|i| 0.01 + f64::from(i % 3) * 0.0001).collect();
        values[15] = 0.5;
        let (kept, report) = reject_outliers(series(&values), 3.0, 1.5);
        assert_eq!(kept.len(), 29);
        assert_eq!(report.removed, 1);
        assert!(kept.iter().all(|p| p.distance_3d < 0.1));
    }

    #[test]
    fn single_vote_survives() {
        // A wide but steady ramp: the final step is IQR-normal and
        // sigma-normal, and the velocity rule alone cannot remove it.
        let mut values: Vec<f64> = (0..20).map(|i| f64::from(i) * 0.001).collect();
        values[19] = 0.025;
        let points = series(&values);
        let vel = velocity_flags(&points, 3.0);
        let sig = sigma_flags(&values, 3.0);
        let iqr = iqr_flags(&values, 1.5);
        assert!(vel[19]);
        assert!(!sig[19] && !iqr[19]);

        let (kept, report) = reject_outliers(points, 3.0, 1.5);
        assert_eq!(kept.len(), 20);
        assert_eq!(report.removed, 0);
        assert_eq!(report.velocity, 1);
    }

    /// Alternates between 0 and `STEP`, so every step has the same speed.
    fn zigzag(len: usize) -> Vec<f64> {
        (0..len).map(|i| if i % 2 == 0 { 0.0 } else { STEP }).collect()
    }

    const STEP: f64 = 1.0 / 1024.0;

    #[test]
    fn gradual_peak_flagged_by_sigma_and_iqr_is_removed() {
        let mut values = zigzag(40);
        values[20..27].copy_from_slice(&[
            0.0,
            STEP,
            2.0 * STEP,
            3.0 * STEP,
            4.0 * STEP,
            3.0 * STEP,
            2.0 * STEP,
        ]);
        let points = series(&values);
        assert!(sigma_flags(&values, 3.0)[24]);
        assert!(iqr_flags(&values, 1.5)[24]);
        assert!(!velocity_flags(&points, 3.0)[24]);

        let (kept, report) = reject_outliers(points, 3.0, 1.5);
        assert_eq!(report.removed, 1);
        assert_eq!(report.iqr, 3);
        assert_eq!(kept.len(), 39);
        assert!(kept.iter().all(|p| p.distance_3d < 3.5 * STEP));
    }

    #[test]
    fn jump_onto_plateau_flagged_by_iqr_and_velocity_is_removed() {
        let mut values = zigzag(40);
        values[20..28].fill(0.05);
        let points = series(&values);
        assert!(!sigma_flags(&values, 3.0)[20]);
        assert!(iqr_flags(&values, 1.5)[20]);
        assert!(velocity_flags(&points, 3.0)[20]);

        let (kept, report) = reject_outliers(points, 3.0, 1.5);
        assert_eq!(report.removed, 1);
        assert_eq!(report.sigma, 0);
        assert_eq!(report.velocity, 2);
        assert_eq!(kept.len(), 39);
        assert_eq!(kept.iter().filter(|p| p.distance_3d > 0.01).count(), 7);
        // Leaving the plateau only trips the velocity rule.
        assert!(kept.iter().any(|p| p.timestamp == series(&values)[28].timestamp));
    }
}
