//! Risk derived from the forecast itself.

use gps_deform_models::TrendDirection;
use gps_deform_signal::{linear_slope, max_abs, mean};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

const METRES_TO_MM: f64 = 1000.0;
const TREND_THRESHOLD_MM: f64 = 0.01;
const STEEP_TREND_MM: f64 = 0.05;

/// Forecast displacement thresholds in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 3.0,
            high: 5.0,
            critical: 10.0,
        }
    }
}

/// Five-step grade used for forecast risk.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskGrade {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskGrade {
    /// Score on the 1 (minimal) to 5 (critical) scale.
    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            Self::Minimal => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }

    /// Grade for a weighted score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 4.5 {
            Self::Critical
        } else if score >= 3.5 {
            Self::High
        } else if score >= 2.5 {
            Self::Medium
        } else if score >= 1.5 {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    /// Operator guidance for this grade.
    #[must_use]
    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::Minimal => "Deformation is negligible; continue routine monitoring.",
            Self::Low => "Deformation is small; consider increasing the monitoring frequency.",
            Self::Medium => {
                "Deformation is moderate; add monitoring points and prepare the emergency plan."
            }
            Self::High => {
                "Deformation is large; intensify monitoring immediately and start the warning procedure."
            }
            Self::Critical => {
                "Deformation has reached a dangerous level; start the emergency response and consider evacuation."
            }
        }
    }
}

/// Risk of one forecast horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonRisk {
    pub level: RiskGrade,
    pub probability: f64,
    /// Largest absolute forecast value, mm.
    pub max_value: f64,
    /// Mean absolute forecast value, mm.
    pub avg_value: f64,
    /// Number of steps above the medium threshold.
    pub exceedance_count: usize,
}

/// Risk from the direction of the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendRisk {
    pub direction: TrendDirection,
    pub magnitude: f64,
    /// Short-horizon slope, mm per step.
    pub short_term_trend: f64,
    /// Long-horizon slope, mm per step.
    pub long_term_trend: f64,
    pub level: RiskGrade,
}

/// Weighted combination of the horizon and trend risks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRisk {
    pub level: RiskGrade,
    pub score: f64,
}

/// Complete forecast risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRisk {
    pub short_term: HorizonRisk,
    pub long_term: HorizonRisk,
    pub trend: TrendRisk,
    pub overall: OverallRisk,
    pub thresholds: RiskThresholds,
    pub recommendation: String,
}

fn to_mm(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v * METRES_TO_MM).collect()
}

/// Grades the largest absolute value of `values_mm`.
#[must_use]
pub fn horizon_risk(values_mm: &[f64], thresholds: &RiskThresholds) -> HorizonRisk {
    let max_value = max_abs(values_mm);
    let (level, probability) = if max_value >= thresholds.critical {
        (RiskGrade::Critical, 0.9)
    } else if max_value >= thresholds.high {
        (RiskGrade::High, 0.7)
    } else if max_value >= thresholds.medium {
        (RiskGrade::Medium, 0.5)
    } else if max_value >= thresholds.low {
        (RiskGrade::Low, 0.3)
    } else {
        (RiskGrade::Minimal, 0.1)
    };

    let absolutes: Vec<f64> = values_mm.iter().map(|v| v.abs()).collect();
    HorizonRisk {
        level,
        probability,
        max_value,
        avg_value: mean(&absolutes),
        exceedance_count: absolutes.iter().filter(|v| **v > thresholds.medium).count(),
    }
}

/// Grades the slope of the long-horizon forecast.
#[must_use]
pub fn trend_risk(short_mm: &[f64], long_mm: &[f64]) -> TrendRisk {
    let long_term_trend = linear_slope(long_mm);
    let magnitude = long_term_trend.abs();
    let (direction, level) = if long_term_trend > TREND_THRESHOLD_MM {
        let level = if magnitude > STEEP_TREND_MM {
            RiskGrade::High
        } else {
            RiskGrade::Medium
        };
        (TrendDirection::Increasing, level)
    } else if long_term_trend < -TREND_THRESHOLD_MM {
        (TrendDirection::Decreasing, RiskGrade::Low)
    } else {
        (TrendDirection::Stable, RiskGrade::Low)
    };

    TrendRisk {
        direction,
        magnitude,
        short_term_trend: linear_slope(short_mm),
        long_term_trend,
        level,
    }
}

/// Assesses forecast values given in metres.
#[must_use]
pub fn assess(short_term: &[f64], long_term: &[f64], thresholds: RiskThresholds) -> PredictionRisk {
    let short_mm = to_mm(short_term);
    let long_mm = to_mm(long_term);

    let short = horizon_risk(&short_mm, &thresholds);
    let long = horizon_risk(&long_mm, &thresholds);
    let trend = trend_risk(&short_mm, &long_mm);

    let score = 0.2f64.mul_add(
        f64::from(trend.level.score()),
        0.4 * f64::from(short.level.score()) + 0.4 * f64::from(long.level.score()),
    );
    let level = RiskGrade::from_score(score);

    PredictionRisk {
        short_term: short,
        long_term: long,
        trend,
        overall: OverallRisk { level, score },
        thresholds,
        recommendation: level.recommendation().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_grades_use_inclusive_thresholds() {
        let t = RiskThresholds::default();
        let grade = |mm: f64| horizon_risk(&[0.0, -mm], &t).level;
        assert_eq!(grade(0.5), RiskGrade::Minimal);
        assert_eq!(grade(1.0), RiskGrade::Low);
        assert_eq!(grade(3.0), RiskGrade::Medium);
        assert_eq!(grade(5.0), RiskGrade::High);
        assert_eq!(grade(10.0), RiskGrade::Critical);
    }

    #[test]
    fn score_maps_back_to_grade() {
        assert_eq!(RiskGrade::from_score(4.5), RiskGrade::Critical);
        assert_eq!(RiskGrade::from_score(4.4), RiskGrade::High);
        assert_eq!(RiskGrade::from_score(1.4), RiskGrade::Minimal);
        assert_eq!(RiskGrade::Critical.score(), 5);
    }

    #[test]
    fn steep_rise_is_high_trend_risk() {
        let long: Vec<f64> = (0..168).map(|i| f64::from(i) * 0.1).collect();
        let trend = trend_risk(&[], &long);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert_eq!(trend.level, RiskGrade::High);

        let falling: Vec<f64> = long.iter().map(|v| -v).collect();
        assert_eq!(trend_risk(&[], &falling).level, RiskGrade::Low);
    }

    #[test]
    fn large_forecast_is_critical() {
        // 60 mm rising by 1 mm per step.
        let short: Vec<f64> = (0..24).map(|i| 0.06 + f64::from(i) * 0.001).collect();
        let long: Vec<f64> = (0..168).map(|i| 0.06 + f64::from(i) * 0.001).collect();
        let risk = assess(&short, &long, RiskThresholds::default());
        assert_eq!(risk.short_term.level, RiskGrade::Critical);
        assert_eq!(risk.trend.level, RiskGrade::High);
        // 0.4·5 + 0.4·5 + 0.2·4
        assert!((risk.overall.score - 4.8).abs() < 1e-12);
        assert_eq!(risk.overall.level, RiskGrade::Critical);
        assert_eq!(risk.short_term.exceedance_count, 24);
    }
}
