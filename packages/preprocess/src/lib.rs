#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Displacement series cleaning.
//!
//! [`preprocess`] runs three time-order-preserving stages: majority-vote
//! outlier rejection, gap interpolation, and smoothing chosen by the mean
//! point confidence. Smoothing works on `distance_3d` and re-derives the
//! horizontal component so the `sqrt(h² + v²)` invariant keeps holding.

pub mod interpolate;
pub mod outliers;
pub mod smoothing;

use gps_deform_models::DisplacementPoint;
use serde::{Deserialize, Serialize};

pub use outliers::OutlierReport;
pub use smoothing::SmoothingMethod;

/// Errors from preprocessing.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    /// Too few points remain after cleaning.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Configured minimum number of points.
        required: usize,
        /// Number of points available.
        actual: usize,
    },
}

/// Tunable preprocessing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PreprocessConfig {
    /// Minimum number of measured points after outlier rejection.
    pub min_data_points: usize,
    /// Multiplier for the 3σ and velocity detectors.
    pub outlier_sigma: f64,
    /// Multiplier for the Tukey IQR fence.
    pub iqr_factor: f64,
    /// A gap is longer than `gap_factor × median interval`.
    pub gap_factor: f64,
    /// Maximum number of points inserted into a single gap.
    pub max_interpolated_per_gap: usize,
    /// Inserted points get this factor times the lower neighbour
    /// confidence.
    pub interpolated_confidence_factor: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_data_points: 10,
            outlier_sigma: 3.0,
            iqr_factor: 1.5,
            gap_factor: 3.0,
            max_interpolated_per_gap: 1000,
            interpolated_confidence_factor: 0.8,
        }
    }
}

/// A cleaned displacement series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessedSeries {
    /// Cleaned points in time order.
    pub points: Vec<DisplacementPoint>,
    /// Per-detector outlier counts.
    pub removed_outliers: OutlierReport,
    /// Number of points inserted by gap filling.
    pub interpolated_count: usize,
    /// Filter that was applied.
    pub smoothing: SmoothingMethod,
}

impl PreprocessedSeries {
    /// The cleaned `distance_3d` values.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.distance_3d).collect()
    }

    /// Mean confidence of the cleaned points.
    #[must_use]
    pub fn mean_confidence(&self) -> f64 {
        let confidences: Vec<f64> = self.points.iter().map(|p| p.confidence).collect();
        gps_deform_signal::mean(&confidences)
    }
}

/// Cleans a time-ordered displacement series.
///
/// # Errors
///
/// Returns [`PreprocessError::InsufficientData`] if fewer than
/// `config.min_data_points` points are given or survive outlier rejection.
pub fn preprocess(
    points: Vec<DisplacementPoint>,
    config: &PreprocessConfig,
) -> Result<PreprocessedSeries, PreprocessError> {
    ensure_enough(points.len(), config)?;

    let (points, removed_outliers) =
        outliers::reject_outliers(points, config.outlier_sigma, config.iqr_factor);
    if removed_outliers.removed > 0 {
        log::debug!(
            "Removed {} outliers (sigma={}, iqr={}, velocity={})",
            removed_outliers.removed,
            removed_outliers.sigma,
            removed_outliers.iqr,
            removed_outliers.velocity
        );
    }
    ensure_enough(points.len(), config)?;

    let (mut points, interpolated_count) = interpolate::fill_gaps(
        points,
        config.gap_factor,
        config.max_interpolated_per_gap,
        config.interpolated_confidence_factor,
    );
    if interpolated_count > 0 {
        log::debug!("Interpolated {interpolated_count} points across gaps");
    }

    let smoothing = if points.len() >= 3 {
        let confidences: Vec<f64> = points.iter().map(|p| p.confidence).collect();
        SmoothingMethod::for_confidence(gps_deform_signal::mean(&confidences))
    } else {
        SmoothingMethod::None
    };
    let values: Vec<f64> = points.iter().map(|p| p.distance_3d).collect();
    for (point, smoothed) in points.iter_mut().zip(smoothing.apply(&values)) {
        point.set_distance_3d(smoothed);
    }

    Ok(PreprocessedSeries {
        points,
        removed_outliers,
        interpolated_count,
        smoothing,
    })
}

const fn ensure_enough(actual: usize, config: &PreprocessConfig) -> Result<(), PreprocessError> {
    if actual < config.min_data_points {
        return Err(PreprocessError::InsufficientData {
            required: config.min_data_points,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn series(values: &[f64], confidence: f64) -> Vec<DisplacementPoint> {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DisplacementPoint {
                timestamp: start + Duration::hours(i64::try_from(i).unwrap()),
                latitude: 22.6847,
                longitude: 110.1893,
                horizontal: *v,
                vertical: 0.0,
                distance_3d: *v,
                bearing: 90.0,
                confidence,
                measurement_error: 0.006,
                interpolated: false,
            })
            .collect()
    }

    #[test]
    fn too_few_points_is_insufficient_data() {
        let err = preprocess(series(&[0.001; 9], 0.9), &PreprocessConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::InsufficientData {
                required: 10,
                actual: 9
            }
        ));
    }

    #[test]
    fn smoothing_keeps_distance_invariant_and_order() {
        let values: Vec<f64> = (0..40).map(|i| f64::from(i) * 0.001).collect();
        let cleaned = preprocess(series(&values, 0.9), &PreprocessConfig::default()).unwrap();
        assert_eq!(cleaned.smoothing, SmoothingMethod::MovingAverage);
        assert_eq!(cleaned.points.len(), 40);
        for p in &cleaned.points {
            assert!((p.horizontal.hypot(p.vertical) - p.distance_3d).abs() < 1e-12);
        }
        assert!(
            cleaned
                .points
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp)
        );
        // interior of a linear ramp is a fixed point of the moving average
        assert!((cleaned.points[20].distance_3d - 0.020).abs() < 1e-12);
    }

    #[test]
    fn low_confidence_series_uses_kalman() {
        let cleaned =
            preprocess(series(&[0.002; 12], 0.4), &PreprocessConfig::default()).unwrap();
        assert_eq!(cleaned.smoothing, SmoothingMethod::Kalman);
        assert!((cleaned.mean_confidence() - 0.4).abs() < 1e-12);
    }
}
