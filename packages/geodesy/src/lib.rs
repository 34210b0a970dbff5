#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geodesy for GPS deformation monitoring.
//!
//! Distances use the haversine central angle scaled by the WGS84 radius of
//! curvature at the mean latitude of the two points, which keeps
//! millimetre-scale displacements stable across latitudes. Coordinates are
//! [`geo::Point`] values with `x = longitude` and `y = latitude`.

use geo::Point;
use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis in metres.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Errors from coordinate validation.
#[derive(Debug, thiserror::Error)]
pub enum GeodesyError {
    /// Latitude or longitude is out of range or not finite.
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },
}

/// Checks that a coordinate pair is finite and in range, returning it as a
/// [`geo::Point`].
///
/// # Errors
///
/// Returns [`GeodesyError::InvalidCoordinate`] if `|lat| > 90`,
/// `|lon| > 180` or either value is not finite.
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<Point<f64>, GeodesyError> {
    if latitude.is_finite()
        && longitude.is_finite()
        && latitude.abs() <= 90.0
        && longitude.abs() <= 180.0
    {
        Ok(Point::new(longitude, latitude))
    } else {
        Err(GeodesyError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// WGS84 radius of curvature at the given latitude (degrees), in metres.
#[must_use]
pub fn earth_radius_at(latitude: f64) -> f64 {
    let a = WGS84_A;
    let b = a * (1.0 - WGS84_F);
    let (sin, cos) = latitude.to_radians().sin_cos();
    let num = (a * a * cos).powi(2) + (b * b * sin).powi(2);
    let den = (a * cos).powi(2) + (b * sin).powi(2);
    (num / den).sqrt()
}

/// Distance in metres between two points.
#[must_use]
pub fn distance(from: Point<f64>, to: Point<f64>) -> f64 {
    let (lat1, lat2) = (from.y().to_radians(), to.y().to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (to.x() - from.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    earth_radius_at(f64::midpoint(from.y(), to.y())) * c
}

/// Initial bearing in degrees from `from` to `to`, normalized to `[0, 360)`.
#[must_use]
pub fn bearing(from: Point<f64>, to: Point<f64>) -> f64 {
    let (lat1, lat2) = (from.y().to_radians(), to.y().to_radians());
    let d_lon = (to.x() - from.x()).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos().mul_add(lat2.sin(), -(lat1.sin() * lat2.cos() * d_lon.cos()));
    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if degrees >= 360.0 { 0.0 } else { degrees }
}

// ── Error model ─────────────────────────────────────────────────────

/// Per-point GPS measurement error budget.
///
/// All terms are in metres. The atmospheric term grows with the distance
/// from the baseline: `atmospheric · (1 + d / atmospheric_scale)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ErrorModel {
    /// Uncertainty of the baseline position itself.
    pub baseline: f64,
    /// Receiver measurement noise.
    pub measurement: f64,
    /// Atmospheric delay at zero distance.
    pub atmospheric: f64,
    /// Distance over which the atmospheric term doubles.
    pub atmospheric_scale: f64,
    /// Multipath reflections.
    pub multipath: f64,
    /// Receiver clock error.
    pub clock: f64,
}

impl Default for ErrorModel {
    fn default() -> Self {
        Self {
            baseline: 0.001,
            measurement: 0.002,
            atmospheric: 0.001,
            atmospheric_scale: 1000.0,
            multipath: 0.002,
            clock: 0.0005,
        }
    }
}

/// Result of evaluating the [`ErrorModel`] at a displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEstimate {
    /// Root-sum-of-squares of the five error terms.
    pub horizontal: f64,
    /// `1.5 × horizontal`.
    pub vertical: f64,
    /// `sqrt(horizontal² + vertical²)`.
    pub total: f64,
    /// `clamp(1 − exp(−d / total), 0.1, 0.99)`.
    pub confidence: f64,
}

impl ErrorModel {
    /// Evaluates the error budget for a point `distance` metres from the
    /// baseline.
    #[must_use]
    pub fn estimate(&self, distance: f64) -> ErrorEstimate {
        let atmospheric = self.atmospheric * (1.0 + distance / self.atmospheric_scale);
        let horizontal = [
            self.baseline,
            self.measurement,
            atmospheric,
            self.multipath,
            self.clock,
        ]
        .iter()
        .map(|term| term * term)
        .sum::<f64>()
        .sqrt();
        let vertical = horizontal * 1.5;
        let total = horizontal.hypot(vertical);
        let confidence = if total > 0.0 {
            (1.0 - (-distance / total).exp()).clamp(0.1, 0.99)
        } else {
            0.99
        };

        ErrorEstimate {
            horizontal,
            vertical,
            total,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_have_zero_distance() {
        let p = Point::new(110.1893, 22.6847);
        assert!(distance(p, p).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_at_equator() {
        let d = distance(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((d - 111_319.5).abs() < 50.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Point::new(110.1893, 22.6847);
        let b = Point::new(110.189_31, 22.684_71);
        assert!((distance(a, b) - distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Point::new(110.0, 22.0);
        assert!(bearing(origin, Point::new(110.0, 22.1)).abs() < 1e-6);
        assert!((bearing(origin, Point::new(110.1, 22.0)) - 90.0).abs() < 0.1);
        assert!((bearing(origin, Point::new(110.0, 21.9)) - 180.0).abs() < 1e-6);
        assert!((bearing(origin, Point::new(109.9, 22.0)) - 270.0).abs() < 0.1);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(validate_coordinate(22.6847, 110.1893).is_ok());
        assert!(validate_coordinate(90.5, 0.0).is_err());
        assert!(validate_coordinate(0.0, -180.5).is_err());
        assert!(validate_coordinate(f64::NAN, 0.0).is_err());
        let p = validate_coordinate(10.0, 20.0).unwrap();
        assert!((p.x() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_model_default_budget() {
        let estimate = ErrorModel::default().estimate(0.0);
        let expected_h = 10.25e-6_f64.sqrt();
        assert!((estimate.horizontal - expected_h).abs() < 1e-12);
        assert!((estimate.vertical - 1.5 * expected_h).abs() < 1e-12);
        assert!((estimate.confidence - 0.1).abs() < 1e-12);
    }

    #[test]
    fn confidence_grows_with_distance_and_saturates() {
        let model = ErrorModel::default();
        let near = model.estimate(0.005).confidence;
        let far = model.estimate(0.05).confidence;
        assert!(far > near);
        assert!((model.estimate(10.0).confidence - 0.99).abs() < 1e-12);
    }
}
