//! Synthetic position fixes for demonstrations and tests.
//!
//! Nothing in the analysis path calls into this module. Generated fixes are
//! tagged with the `synthetic` source id so they are never mistaken for
//! sensor data.

use chrono::{DateTime, Duration, Utc};
use gps_deform_geodesy::earth_radius_at;
use gps_deform_models::PositionFix;
use gps_deform_signal::SeededRng;

/// Source id carried by every generated fix.
pub const SYNTHETIC_SOURCE: &str = "synthetic";

/// Shape of a drifting-station scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftScenario {
    pub baseline_latitude: f64,
    pub baseline_longitude: f64,
    /// Time of the first fix; fixes follow hourly.
    pub start: DateTime<Utc>,
    pub hours: u32,
    /// Eastward drift in millimetres per hour.
    pub drift_mm_per_hour: f64,
    /// Standard deviation of the east and north noise in millimetres.
    pub noise_mm: f64,
    pub seed: u32,
}

impl Default for DriftScenario {
    fn default() -> Self {
        Self {
            baseline_latitude: 22.6847,
            baseline_longitude: 110.1893,
            start: DateTime::UNIX_EPOCH,
            hours: 60,
            drift_mm_per_hour: 1.0,
            noise_mm: 0.5,
            seed: 12_345,
        }
    }
}

/// Hourly fixes drifting east from the baseline with Gaussian noise. The
/// fix at hour `i` (1-based) sits `i · drift` east of the baseline.
#[must_use]
pub fn drifting_fixes(scenario: &DriftScenario) -> Vec<PositionFix> {
    let mut rng = SeededRng::new(scenario.seed);
    let radius = earth_radius_at(scenario.baseline_latitude);
    let metres_per_degree_lat = radius.to_radians();
    let metres_per_degree_lon = metres_per_degree_lat * scenario.baseline_latitude.to_radians().cos();

    (1..=scenario.hours)
        .map(|hour| {
            let east = (f64::from(hour) * scenario.drift_mm_per_hour
                + rng.next_gaussian() * scenario.noise_mm)
                / 1000.0;
            let north = rng.next_gaussian() * scenario.noise_mm / 1000.0;
            PositionFix {
                timestamp: scenario.start + Duration::hours(i64::from(hour)),
                latitude: scenario.baseline_latitude + north / metres_per_degree_lat,
                longitude: scenario.baseline_longitude + east / metres_per_degree_lon,
                source_id: SYNTHETIC_SOURCE.to_string(),
                reported_confidence: None,
                horizontal_accuracy: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use gps_deform_geodesy::distance;

    use super::*;

    #[test]
    fn noiseless_drift_is_linear_in_metres() {
        let scenario = DriftScenario {
            noise_mm: 0.0,
            ..DriftScenario::default()
        };
        let fixes = drifting_fixes(&scenario);
        assert_eq!(fixes.len(), 60);

        let origin = Point::new(scenario.baseline_longitude, scenario.baseline_latitude);
        let last = fixes.last().unwrap();
        let d = distance(origin, Point::new(last.longitude, last.latitude));
        assert!((d - 0.060).abs() < 1e-4, "got {d}");
        assert!(fixes.iter().all(|f| f.source_id == SYNTHETIC_SOURCE));
    }

    #[test]
    fn same_seed_same_fixes() {
        let scenario = DriftScenario::default();
        assert_eq!(drifting_fixes(&scenario), drifting_fixes(&scenario));
    }
}
