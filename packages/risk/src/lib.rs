#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Maps analysis results onto the four-level warning scale.
//!
//! The level comes from the maximum displacement, raised by the trend, by
//! the deformation type at the point of maximum displacement, and finally by
//! the real-time displacement when that is more severe. Every comparison
//! goes through the [`RiskLevel`] helpers.

use gps_deform_forecast::EnsembleForecast;
use gps_deform_models::{DeformationType, DisplacementPoint, RiskLevel};
use gps_deform_pattern::PatternMatchResult;
use serde::{Deserialize, Serialize};

const RATIO_EPSILON: f64 = 1e-4;
const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 0.95;

/// Displacement bands in metres, each inclusive of its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RiskConfig {
    pub red: f64,
    pub orange: f64,
    pub yellow: f64,
    pub blue: f64,
    /// Trend magnitude above which a normal reading becomes blue.
    pub trend_blue_magnitude: f64,
    /// Displacement below which movement is treated as GPS noise.
    pub noise_threshold: f64,
    /// Displacement below which no deformation is reported.
    pub min_deformation: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            red: 0.1,
            orange: 0.05,
            yellow: 0.02,
            blue: 0.005,
            trend_blue_magnitude: 1.0,
            noise_threshold: 0.001,
            min_deformation: 0.002,
        }
    }
}

/// Warning level for a displacement in metres.
#[must_use]
pub fn band_level(displacement: f64, config: &RiskConfig) -> RiskLevel {
    if displacement >= config.red {
        RiskLevel::Red
    } else if displacement >= config.orange {
        RiskLevel::Orange
    } else if displacement >= config.yellow {
        RiskLevel::Yellow
    } else if displacement >= config.blue {
        RiskLevel::Blue
    } else {
        RiskLevel::Normal
    }
}

/// Confidence of the assessment, from displacement strength, trend
/// strength and the best pattern similarity, clamped to `[0.3, 0.95]`.
#[must_use]
pub fn confidence(max_displacement: f64, trend_magnitude: f64, top_similarity: f64) -> f64 {
    let mut confidence = 0.5;

    if max_displacement > 0.1 {
        confidence += 0.3;
    } else if max_displacement > 0.05 {
        confidence += 0.2;
    } else if max_displacement > 0.02 {
        confidence += 0.1;
    }

    if trend_magnitude > 2.0 {
        confidence += 0.2;
    } else if trend_magnitude > 1.0 {
        confidence += 0.1;
    } else if trend_magnitude > 0.0 {
        confidence += 0.05;
    }

    confidence += 0.2 * top_similarity;
    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

// ── Deformation type ────────────────────────────────────────────────

/// Deformation type at the point of maximum displacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeformationTypeAssessment {
    pub kind: DeformationType,
    pub code: i8,
    /// Displacement of the deciding point.
    pub distance_3d: f64,
    pub horizontal_ratio: f64,
    pub vertical_ratio: f64,
}

/// Classifies the movement at the point with the largest `distance_3d`.
///
/// An empty series has no deformation.
#[must_use]
pub fn classify_deformation_type(
    points: &[DisplacementPoint],
    config: &RiskConfig,
) -> DeformationTypeAssessment {
    let Some(max) = points
        .iter()
        .max_by(|a, b| a.distance_3d.total_cmp(&b.distance_3d))
    else {
        return DeformationTypeAssessment {
            kind: DeformationType::None,
            code: DeformationType::None.code(),
            distance_3d: 0.0,
            horizontal_ratio: 0.0,
            vertical_ratio: 0.0,
        };
    };

    let d = max.distance_3d;
    let h = max.horizontal.abs() / (d + RATIO_EPSILON);
    let v = max.vertical.abs() / (d + RATIO_EPSILON);

    let kind = if d < config.noise_threshold {
        DeformationType::Noise
    } else if d < config.min_deformation {
        DeformationType::None
    } else if h > 0.8 && v < 0.3 {
        DeformationType::Horizontal
    } else if v > 0.8 && h < 0.3 {
        DeformationType::Vertical
    } else if h > 0.4 && v > 0.4 {
        DeformationType::Combined
    } else {
        DeformationType::Rotation
    };
    log::debug!("deformation type {kind}: d={d:.4} m, h={h:.3}, v={v:.3}");

    DeformationTypeAssessment {
        kind,
        code: kind.code(),
        distance_3d: d,
        horizontal_ratio: h,
        vertical_ratio: v,
    }
}

/// Raises a normal level when real deformation was detected: complex
/// movement becomes orange, any other detected type red. Warning levels are
/// left unchanged.
#[must_use]
pub const fn escalate(level: RiskLevel, kind: DeformationType) -> RiskLevel {
    if level.is_warning() || !kind.is_detected() {
        level
    } else if kind.is_complex() {
        RiskLevel::Orange
    } else {
        RiskLevel::Red
    }
}

// ── Assessment ──────────────────────────────────────────────────────

/// Numeric inputs behind an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub max_displacement: f64,
    pub trend_magnitude: f64,
    pub pattern_similarity: f64,
    #[serde(default)]
    pub pattern_risk: Option<RiskLevel>,
    #[serde(default)]
    pub forecast_max_displacement: Option<f64>,
    #[serde(default)]
    pub real_time_displacement: Option<f64>,
}

/// Final warning level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub label: String,
    pub confidence: f64,
    pub contributing_factors: Vec<String>,
    pub factors: RiskFactors,
}

/// Everything the classifier folds in.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    /// Largest cleaned displacement, metres.
    pub max_displacement: f64,
    /// Half-split trend magnitude.
    pub trend_magnitude: f64,
    pub deformation_type: DeformationType,
    pub patterns: Option<&'a PatternMatchResult>,
    pub forecast: Option<&'a EnsembleForecast>,
    /// Displacement of the latest fix from the baseline, metres.
    pub real_time_displacement: Option<f64>,
}

fn mm(metres: f64) -> f64 {
    metres * 1000.0
}

/// Classifies the inputs.
#[must_use]
pub fn assess(inputs: &RiskInputs<'_>, config: &RiskConfig) -> RiskAssessment {
    let mut contributing = Vec::new();

    let mut level = band_level(inputs.max_displacement, config);
    if level.is_warning() {
        contributing.push(format!(
            "Displacement {:.1} mm reached {}",
            mm(inputs.max_displacement),
            level.label()
        ));
    } else if inputs.trend_magnitude > config.trend_blue_magnitude {
        level = RiskLevel::Blue;
        contributing.push(format!(
            "Trend magnitude {:.3} exceeds {}",
            inputs.trend_magnitude, config.trend_blue_magnitude
        ));
    } else {
        contributing.push(format!(
            "Displacement {:.1} mm below warning thresholds",
            mm(inputs.max_displacement)
        ));
    }

    if inputs.deformation_type.is_detected() {
        let escalated = escalate(level, inputs.deformation_type);
        contributing.push(format!("Detected {} deformation", inputs.deformation_type));
        if escalated != level {
            log::debug!("deformation type raised risk from {level} to {escalated}");
            level = escalated;
        }
    }

    let top_similarity = inputs
        .patterns
        .and_then(|p| p.top_matches.first())
        .map_or(0.0, |m| m.similarity);
    let pattern_risk = inputs.patterns.map(|p| p.risk.level);
    if let Some(patterns) = inputs.patterns {
        contributing.push(format!(
            "Pattern risk {}: {}",
            patterns.risk.level.label(),
            patterns.risk.description
        ));
    }

    let forecast_max_displacement = inputs.forecast.map(EnsembleForecast::max_displacement);
    if let Some(forecast) = inputs.forecast {
        contributing.push(format!(
            "Forecast peak {:.1} mm, prediction risk {}",
            mm(forecast.max_displacement()),
            forecast.risk.overall.level
        ));
    }

    if let Some(real_time) = inputs.real_time_displacement {
        let real_time_level = band_level(real_time, config);
        if real_time_level.is_more_severe_than(level) {
            log::info!(
                "Real-time displacement {:.2} mm overrides {level} with {real_time_level}",
                mm(real_time)
            );
            level = real_time_level;
            contributing.push(format!(
                "Real-time displacement {:.1} mm reached {}",
                mm(real_time),
                real_time_level.label()
            ));
        }
    }

    RiskAssessment {
        level,
        label: level.label().to_string(),
        confidence: confidence(inputs.max_displacement, inputs.trend_magnitude, top_similarity),
        contributing_factors: contributing,
        factors: RiskFactors {
            max_displacement: inputs.max_displacement,
            trend_magnitude: inputs.trend_magnitude,
            pattern_similarity: top_similarity,
            pattern_risk,
            forecast_max_displacement,
            real_time_displacement: inputs.real_time_displacement,
        },
    }
}
