//! Converts position fixes into displacement from the baseline.

use chrono::{DateTime, Utc};
use geo::Point;
use gps_deform_geodesy::{ErrorModel, GeodesyError, bearing, distance, validate_coordinate};
use gps_deform_models::{BaselineReference, DisplacementPoint, PositionFix};
use serde::{Deserialize, Serialize};

/// Horizontal displacement above which a point is considered implausible
/// and clamped.
const IMPLAUSIBLE_DISPLACEMENT: f64 = 1000.0;
const CLAMPED_DISPLACEMENT: f64 = 1.0;
/// Horizontal displacement above which a point is logged as large.
const LARGE_DISPLACEMENT: f64 = 0.1;

/// Displacement points plus any data-quality warnings raised while
/// building them.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementSeries {
    pub points: Vec<DisplacementPoint>,
    pub warnings: Vec<String>,
}

/// Displacement of the newest fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeDisplacement {
    /// Total displacement, metres.
    pub displacement: f64,
    /// Horizontal displacement, metres.
    pub horizontal: f64,
    /// Bearing from the baseline, degrees.
    pub bearing: f64,
    pub latest_timestamp: DateTime<Utc>,
}

fn baseline_point(baseline: &BaselineReference) -> Result<Point<f64>, GeodesyError> {
    validate_coordinate(baseline.latitude, baseline.longitude)
}

/// Builds one displacement point per fix with a valid coordinate, in input
/// order.
///
/// Horizontal displacement beyond 1000 m is clamped to 1 m and reported in
/// the warnings; beyond 0.1 m it is only logged.
///
/// # Errors
///
/// Returns [`GeodesyError::InvalidCoordinate`] if the baseline coordinate is
/// out of range.
pub fn build(
    fixes: &[PositionFix],
    baseline: &BaselineReference,
    model: &ErrorModel,
) -> Result<DisplacementSeries, GeodesyError> {
    let origin = baseline_point(baseline)?;
    let mut warnings = Vec::new();
    let mut large = 0_usize;

    let points = fixes
        .iter()
        .filter_map(|fix| {
            let position = validate_coordinate(fix.latitude, fix.longitude).ok()?;
            let mut horizontal = distance(origin, position);

            if horizontal > IMPLAUSIBLE_DISPLACEMENT {
                log::warn!(
                    "Implausible displacement {horizontal:.1} m at {}, clamping to {CLAMPED_DISPLACEMENT} m",
                    fix.timestamp
                );
                warnings.push(format!(
                    "Displacement of {horizontal:.1} m at {} clamped to {CLAMPED_DISPLACEMENT} m",
                    fix.timestamp
                ));
                horizontal = horizontal.abs().min(CLAMPED_DISPLACEMENT);
            } else if horizontal > LARGE_DISPLACEMENT {
                large += 1;
            }

            let vertical = 0.0;
            let error = model.estimate(horizontal);
            Some(DisplacementPoint {
                timestamp: fix.timestamp,
                latitude: fix.latitude,
                longitude: fix.longitude,
                horizontal,
                vertical,
                distance_3d: horizontal.hypot(vertical),
                bearing: bearing(origin, position),
                confidence: error.confidence,
                measurement_error: error.total,
                interpolated: false,
            })
        })
        .collect();

    if large > 0 {
        log::warn!("{large} fixes are more than {LARGE_DISPLACEMENT} m from the baseline");
    }

    Ok(DisplacementSeries { points, warnings })
}

/// Displacement of the newest fix with a valid coordinate.
///
/// # Errors
///
/// Returns [`GeodesyError::InvalidCoordinate`] if the baseline coordinate is
/// out of range.
pub fn real_time(
    fixes: &[PositionFix],
    baseline: &BaselineReference,
) -> Result<Option<RealTimeDisplacement>, GeodesyError> {
    let origin = baseline_point(baseline)?;
    let latest = fixes
        .iter()
        .filter(|fix| fix.has_valid_coordinates())
        .max_by_key(|fix| fix.timestamp);

    Ok(latest.map(|fix| {
        let position = Point::new(fix.longitude, fix.latitude);
        let horizontal = distance(origin, position);
        RealTimeDisplacement {
            displacement: horizontal,
            horizontal,
            bearing: bearing(origin, position),
            latest_timestamp: fix.timestamp,
        }
    }))
}
