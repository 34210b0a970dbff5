//! Data-quality scoring of a cleaned series.

use gps_deform_models::DisplacementPoint;
use gps_deform_signal::{max_abs, mean, std_dev};
use serde::{Deserialize, Serialize};

/// Quality of the data behind an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    /// Mean of the three components, in `[0, 1]`.
    pub score: f64,
    /// Cleaned points over fetched fixes.
    pub completeness: f64,
    /// Penalizes implausible magnitudes and high dispersion.
    pub consistency: f64,
    /// Grows with point count and time span.
    pub accuracy: f64,
    /// Fixes fetched from the store.
    pub total_points: usize,
    /// Points left after cleaning.
    pub valid_points: usize,
}

fn consistency(values: &[f64]) -> f64 {
    let max = max_abs(values);
    let base = if max > 1.0 {
        0.3
    } else if max > 0.5 {
        0.6
    } else if max > 0.1 {
        0.8
    } else {
        0.9
    };

    let m = mean(values);
    let cv = if m == 0.0 { 0.0 } else { std_dev(values) / m.abs() };
    if cv > 1.0 {
        base * 0.7
    } else if cv > 0.5 {
        base * 0.85
    } else {
        base
    }
}

fn accuracy(points: &[DisplacementPoint]) -> f64 {
    let base = match points.len() {
        0..20 => 0.4,
        20..50 => 0.6,
        50..100 => 0.75,
        100..200 => 0.85,
        _ => 0.95,
    };

    let span_hours = match (points.first(), points.last()) {
        #[allow(clippy::cast_precision_loss)]
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds() as f64 / 3600.0,
        _ => 0.0,
    };
    if span_hours < 1.0 {
        base * 0.7
    } else if span_hours < 6.0 {
        base * 0.85
    } else if span_hours < 24.0 {
        base * 0.95
    } else {
        base
    }
}

/// Scores `points` (cleaned, time-ordered) against the `total_points`
/// fixes they came from.
#[must_use]
pub fn assess(points: &[DisplacementPoint], total_points: usize) -> DataQuality {
    #[allow(clippy::cast_precision_loss)]
    let completeness = if total_points == 0 {
        0.0
    } else {
        (points.len() as f64 / total_points as f64).min(1.0)
    };
    let values: Vec<f64> = points.iter().map(|p| p.distance_3d).collect();
    let consistency = consistency(&values);
    let accuracy = accuracy(points);

    DataQuality {
        score: ((completeness + consistency + accuracy) / 3.0).clamp(0.0, 1.0),
        completeness,
        consistency,
        accuracy,
        total_points,
        valid_points: points.len(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn series(count: i64, step: Duration, value: impl Fn(i64) -> f64) -> Vec<DisplacementPoint> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let d = value(i);
                DisplacementPoint {
                    timestamp: start + step * i32::try_from(i).unwrap(),
                    latitude: 0.0,
                    longitude: 0.0,
                    horizontal: d,
                    vertical: 0.0,
                    distance_3d: d,
                    bearing: 90.0,
                    confidence: 0.9,
                    measurement_error: 0.005,
                    interpolated: false,
                }
            })
            .collect()
    }

    #[test]
    fn hourly_ramp_scores() {
        #[allow(clippy::cast_precision_loss)]
        let points = series(60, Duration::hours(1), |i| (i + 1) as f64 * 0.001);
        let q = assess(&points, 60);
        assert!((q.completeness - 1.0).abs() < f64::EPSILON);
        // CV of 1..60 mm is about 0.57.
        assert!((q.consistency - 0.9 * 0.85).abs() < 1e-12);
        assert!((q.accuracy - 0.75).abs() < 1e-12);
        assert!((q.score - (1.0 + 0.765 + 0.75) / 3.0).abs() < 1e-12);
        assert_eq!(q.valid_points, 60);
    }

    #[test]
    fn short_dense_series_is_penalized() {
        let points = series(15, Duration::minutes(2), |_| 0.6);
        let q = assess(&points, 30);
        assert!((q.completeness - 0.5).abs() < f64::EPSILON);
        assert!((q.consistency - 0.6).abs() < f64::EPSILON);
        assert!((q.accuracy - 0.4 * 0.7).abs() < 1e-12);
    }

    #[test]
    fn widely_dispersed_values_lower_consistency() {
        let values = [0.0, 0.0, 0.0, 0.09];
        assert!((consistency(&values) - 0.9 * 0.7).abs() < 1e-12);
    }
}
