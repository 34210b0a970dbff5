#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for GPS deformation analysis.
//!
//! Every stage of the pipeline (geodesy, baseline resolution, displacement
//! building, preprocessing, decomposition, pattern matching, forecasting and
//! risk classification) exchanges the types defined here. Result types are
//! plain serializable structs so that a CLI or HTTP layer can return them
//! verbatim as JSON.

pub mod pattern;
pub mod risk;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use pattern::{
    ChangeDirection, ChangePoint, DeformationPattern, PatternFeatures, PatternKind, PatternSource,
    SeriesExtremum,
};
pub use risk::{DeformationType, InvalidRiskLevelError, RiskLevel};

/// A single raw positional fix reported by a GPS sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Identifier of the row or message this fix came from.
    pub source_id: String,
    /// Confidence reported by the device firmware, if any.
    #[serde(default)]
    pub reported_confidence: Option<f64>,
    /// Horizontal accuracy estimate reported by the receiver, in metres.
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
}

impl PositionFix {
    /// Returns `true` if the coordinates are finite and within the valid
    /// latitude/longitude ranges.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Where a [`BaselineReference`] came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BaselineSource {
    /// Established by an operator and stored by the baseline store.
    Persisted,
    /// Averaged from the earliest fixes of a batch; never stored.
    Temporary,
}

/// The fixed reference position all displacement is measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineReference {
    /// Reference latitude in decimal degrees.
    pub latitude: f64,
    /// Reference longitude in decimal degrees.
    pub longitude: f64,
    /// Reference altitude in metres, when surveyed.
    #[serde(default)]
    pub altitude: Option<f64>,
    /// When the reference was established.
    pub established_at: DateTime<Utc>,
    /// Operator or process that established the reference.
    #[serde(default)]
    pub established_by: Option<String>,
    /// Free-form operator notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Confidence in the reference position (0-1).
    pub confidence: f64,
    /// Number of fixes the reference was derived from.
    pub sample_count: usize,
    /// Whether the reference is persisted or a temporary estimate.
    pub source: BaselineSource,
}

/// One point of the displacement time series derived from a [`PositionFix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplacementPoint {
    /// Timestamp of the originating fix.
    pub timestamp: DateTime<Utc>,
    /// Latitude of the originating fix.
    pub latitude: f64,
    /// Longitude of the originating fix.
    pub longitude: f64,
    /// Horizontal displacement from the baseline in metres.
    pub horizontal: f64,
    /// Vertical displacement from the baseline in metres.
    pub vertical: f64,
    /// Combined displacement, `sqrt(horizontal² + vertical²)`.
    pub distance_3d: f64,
    /// Bearing from the baseline in degrees `[0, 360)`.
    pub bearing: f64,
    /// Confidence derived from the measurement error budget (0.1-0.99).
    pub confidence: f64,
    /// Root-sum-of-squares measurement error in metres.
    pub measurement_error: f64,
    /// `true` if this point was synthesized by gap interpolation.
    #[serde(default)]
    pub interpolated: bool,
}

impl DisplacementPoint {
    /// Sets the combined displacement, re-deriving the horizontal
    /// component so that `distance_3d = sqrt(horizontal² + vertical²)`
    /// keeps holding.
    pub fn set_distance_3d(&mut self, distance_3d: f64) {
        let distance_3d = distance_3d.max(self.vertical.abs());
        self.horizontal = (distance_3d.mul_add(distance_3d, -(self.vertical * self.vertical)))
            .max(0.0)
            .sqrt();
        self.distance_3d = distance_3d;
    }
}

/// Direction reported by the half-split trend analysis.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    /// Second-half mean is above the first-half mean.
    Increasing,
    /// Second-half mean is below the first-half mean.
    Decreasing,
    /// Means are equal, or there is too little data to tell.
    Stable,
}

/// Cooperative cancellation flag shared between a caller and a running
/// analysis.
///
/// Cloning the flag shares the underlying state, so the caller keeps one
/// clone and hands another to the pipeline. Stages check
/// [`CancelFlag::is_cancelled`] between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`CancelFlag::cancel`] has been called on any
    /// clone of this flag.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(vertical: f64) -> DisplacementPoint {
        DisplacementPoint {
            timestamp: Utc::now(),
            latitude: 0.0,
            longitude: 0.0,
            horizontal: 0.0,
            vertical,
            distance_3d: vertical.abs(),
            bearing: 0.0,
            confidence: 0.9,
            measurement_error: 0.005,
            interpolated: false,
        }
    }

    #[test]
    fn set_distance_keeps_pythagorean_invariant() {
        let mut p = point(0.003);
        p.set_distance_3d(0.005);
        let recomputed = p.horizontal.hypot(p.vertical);
        assert!((recomputed - p.distance_3d).abs() < 1e-12);
        assert!((p.horizontal - 0.004).abs() < 1e-12);
    }

    #[test]
    fn set_distance_never_drops_below_vertical() {
        let mut p = point(0.01);
        p.set_distance_3d(0.002);
        assert!((p.distance_3d - 0.01).abs() < f64::EPSILON);
        assert!(p.horizontal.abs() < f64::EPSILON);
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let mut fix = PositionFix {
            timestamp: Utc::now(),
            latitude: 22.6847,
            longitude: 110.1893,
            source_id: "row-1".to_string(),
            reported_confidence: None,
            horizontal_accuracy: None,
        };
        assert!(fix.has_valid_coordinates());
        fix.latitude = 91.0;
        assert!(!fix.has_valid_coordinates());
        fix.latitude = f64::NAN;
        assert!(!fix.has_valid_coordinates());
    }

    #[test]
    fn displacement_point_uses_camel_case_fields() {
        let json = serde_json::to_value(point(0.0)).unwrap();
        assert!(json.get("distance3d").is_some(), "{json}");
        assert!(json.get("measurementError").is_some(), "{json}");
    }
}
