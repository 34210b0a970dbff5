//! Pattern learning rules: admission, feature analysis, risk scoring and
//! blending.

use gps_deform_features::{change_points, peaks, valleys, volatility};
use gps_deform_models::{DeformationPattern, PatternFeatures, PatternKind, RiskLevel};
use gps_deform_signal::{linear_slope, mean, std_dev};
use serde::{Deserialize, Serialize};

use crate::PatternConfig;

/// Result of offering a sequence to the pattern library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum LearnOutcome {
    /// The sequence did not meet the admission rules.
    Skipped(String),
    /// A new pattern was stored under this id.
    Created(String),
    /// The sequence was blended into the existing pattern with this id.
    Blended(String),
}

/// Checks the admission rules and returns why a sequence is rejected, or
/// `None` if it is worth learning.
#[must_use]
pub fn rejection_reason(
    sequence: &[f64],
    mean_confidence: f64,
    config: &PatternConfig,
) -> Option<String> {
    if sequence.len() < config.min_learn_length {
        return Some(format!(
            "sequence too short: {} < {}",
            sequence.len(),
            config.min_learn_length
        ));
    }
    if mean_confidence < config.min_learn_confidence {
        return Some(format!("mean confidence too low: {mean_confidence:.3}"));
    }

    let max = sequence.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = sequence.iter().copied().fold(f64::INFINITY, f64::min);
    let range = max - min;
    if !(config.min_learn_range..=config.max_learn_range).contains(&range) {
        return Some(format!("range out of bounds: {range:.6} m"));
    }

    let trend = linear_slope(sequence);
    if trend.abs() < config.min_learn_trend {
        return Some(format!("no clear trend: {trend:.2e} m/sample"));
    }

    None
}

/// Computes the stored features of a sequence.
#[must_use]
pub fn analyze(sequence: &[f64], change_point_threshold: f64) -> PatternFeatures {
    PatternFeatures {
        length: sequence.len(),
        mean: mean(sequence),
        std: std_dev(sequence),
        trend: linear_slope(sequence),
        volatility: volatility(sequence),
        peaks: peaks(sequence).len(),
        valleys: valleys(sequence).len(),
        change_points: change_points(sequence, change_point_threshold).len(),
    }
}

/// Maps trend, volatility and change-point count onto a warning level.
#[must_use]
pub fn risk_level(features: &PatternFeatures) -> RiskLevel {
    let trend = features.trend.abs();
    let mut score = 0_u8;

    if trend > 0.0005 {
        score += 2;
    } else if trend > 0.0002 {
        score += 1;
    }

    if features.volatility > 1.0 {
        score += 2;
    } else if features.volatility > 0.5 {
        score += 1;
    }

    if features.change_points > 3 {
        score += 1;
    }

    RiskLevel::from_severity(score)
}

/// Classifies the shape of a learned sequence.
#[must_use]
pub fn classify(features: &PatternFeatures) -> PatternKind {
    let PatternFeatures {
        trend, volatility, ..
    } = *features;

    if trend.abs() < 1e-5 && volatility < 0.1 {
        PatternKind::Stable
    } else if trend > 1e-4 {
        PatternKind::Increasing
    } else if trend < -1e-4 {
        PatternKind::Decreasing
    } else if features.change_points > 2 {
        PatternKind::Fluctuating
    } else if volatility > 0.5 {
        PatternKind::Volatile
    } else {
        PatternKind::Mixed
    }
}

/// Blends `sequence` into `pattern` with weight `weight` for the new data.
///
/// The stored length is kept; indices past the end of `sequence` keep
/// their old value.
pub fn blend(pattern: &mut DeformationPattern, sequence: &[f64], weight: f64) {
    for (i, old) in pattern.sequence.iter_mut().enumerate() {
        let new = sequence.get(i).copied().unwrap_or(*old);
        *old = old.mul_add(1.0 - weight, new * weight);
    }
}
