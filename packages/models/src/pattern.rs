//! Deformation pattern library types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::RiskLevel;

/// Shape classification of a stored pattern.
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
pub enum PatternKind {
    /// Flat, low-volatility series
    Stable,
    /// Clear upward trend
    Increasing,
    /// Clear downward trend
    Decreasing,
    /// Several mean shifts without a dominant trend
    Fluctuating,
    /// High relative volatility
    Volatile,
    /// No single dominant characteristic
    Mixed,
    /// Bootstrap shape: steady linear growth
    LinearTrend,
    /// Bootstrap shape: step change partway through
    SuddenChange,
}

/// Where a pattern in the library came from.
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
pub enum PatternSource {
    /// Built-in deterministic seed pattern
    Bootstrap,
    /// Learned from an analyzed device series
    Learned,
    /// Loaded from an external library
    Imported,
}

/// Direction of a detected mean shift.
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
pub enum ChangeDirection {
    /// Mean after the index is higher
    Increase,
    /// Mean after the index is lower
    Decrease,
}

/// A detected mean shift in a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePoint {
    /// Sample index of the shift.
    pub index: usize,
    /// Absolute difference between the before and after window means.
    pub change: f64,
    /// Whether the mean went up or down.
    pub direction: ChangeDirection,
}

/// A strict local extremum (peak or valley).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesExtremum {
    /// Sample index.
    pub index: usize,
    /// Value at the index.
    pub value: f64,
}

/// Summary features stored alongside a learned pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFeatures {
    /// Number of samples in the sequence.
    pub length: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Least-squares slope per sample.
    pub trend: f64,
    /// Standard deviation of relative returns.
    pub volatility: f64,
    /// Number of strict local maxima.
    pub peaks: usize,
    /// Number of strict local minima.
    pub valleys: usize,
    /// Number of detected change points.
    pub change_points: usize,
}

/// A reference displacement sequence in the pattern library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeformationPattern {
    /// Unique pattern id.
    pub id: String,
    /// Device the pattern was learned from, `None` for global patterns.
    #[serde(default)]
    pub device_id: Option<String>,
    /// The reference sequence, in metres.
    pub sequence: Vec<f64>,
    /// Risk level associated with this shape.
    pub risk_level: RiskLevel,
    /// Features computed when the pattern was created.
    #[serde(default)]
    pub features: Option<PatternFeatures>,
    /// Shape classification.
    pub kind: PatternKind,
    /// Quality weight applied to match confidence (0-1).
    pub quality: f64,
    /// Origin of the pattern.
    pub source: PatternSource,
    /// How many times the pattern has been blended with new data.
    #[serde(default)]
    pub update_count: u32,
    /// When the pattern was created, if known.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the pattern was last blended, if ever.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeformationPattern {
    /// Returns the most recent of `updated_at` and `created_at`.
    #[must_use]
    pub fn last_touched(&self) -> Option<DateTime<Utc>> {
        match (self.updated_at, self.created_at) {
            (Some(updated), Some(created)) => Some(updated.max(created)),
            (updated, created) => updated.or(created),
        }
    }

    /// Returns `true` if the pattern applies to `device_id`, either because
    /// it is global or because it was learned from that device.
    #[must_use]
    pub fn applies_to(&self, device_id: &str) -> bool {
        self.device_id.as_deref().is_none_or(|id| id == device_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn pattern(device_id: Option<&str>) -> DeformationPattern {
        DeformationPattern {
            id: "p".to_string(),
            device_id: device_id.map(str::to_string),
            sequence: vec![0.0, 0.001],
            risk_level: RiskLevel::Normal,
            features: None,
            kind: PatternKind::Stable,
            quality: 1.0,
            source: PatternSource::Learned,
            update_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn global_patterns_apply_to_every_device() {
        assert!(pattern(None).applies_to("dev-1"));
        assert!(pattern(Some("dev-1")).applies_to("dev-1"));
        assert!(!pattern(Some("dev-2")).applies_to("dev-1"));
    }

    #[test]
    fn last_touched_prefers_newest_timestamp() {
        let now = Utc::now();
        let mut p = pattern(None);
        assert_eq!(p.last_touched(), None);
        p.created_at = Some(now - Duration::days(3));
        assert_eq!(p.last_touched(), p.created_at);
        p.updated_at = Some(now);
        assert_eq!(p.last_touched(), Some(now));
    }

    #[test]
    fn kind_parses_from_snake_case() {
        let kind: PatternKind = "sudden_change".parse().unwrap();
        assert_eq!(kind, PatternKind::SuddenChange);
        assert_eq!(PatternKind::LinearTrend.to_string(), "linear_trend");
    }
}
