#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]
#![allow(clippy::cast_precision_loss)]

//! Feature extraction for displacement series.
//!
//! All functions are pure. Values are in metres unless noted; trends are
//! per sample.

use chrono::{DateTime, Utc};
use gps_deform_models::{
    ChangeDirection, ChangePoint, DisplacementPoint, SeriesExtremum, TrendDirection,
};
use gps_deform_signal::{linear_slope, mean, median, std_dev, variance};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

pub use gps_deform_signal::spectral::{dominant_frequency, zero_crossing_frequency};

const MIN_CHANGE_POINT_WINDOW: usize = 5;
const TREND_CONFIDENCE: f64 = 0.8;
const SHORT_TREND_CONFIDENCE: f64 = 0.3;

/// Thresholds used by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FeatureConfig {
    /// Minimum mean shift, in metres, reported as a change point.
    pub change_point_threshold: f64,
    /// Displacement above which the blue-threshold indicator fires.
    pub blue_threshold: f64,
    /// Standard deviation above which the high-variability indicator fires.
    pub volatility_indicator_std: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            change_point_threshold: 0.002,
            blue_threshold: 0.005,
            volatility_indicator_std: 2.0,
        }
    }
}

/// Descriptive statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStatistics {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Population variance.
    pub variance: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// `max − min`.
    pub range: f64,
    /// Third standardized moment, 0 when `std = 0`.
    pub skewness: f64,
    /// Excess kurtosis, 0 when `std = 0`.
    pub kurtosis: f64,
    /// `std / |mean|`, 0 when the mean is 0.
    pub coefficient_of_variation: f64,
}

/// Computes [`BasicStatistics`]; all zeros for an empty slice.
#[must_use]
pub fn basic_statistics(values: &[f64]) -> BasicStatistics {
    if values.is_empty() {
        return BasicStatistics::default();
    }

    let m = mean(values);
    let s = std_dev(values);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let n = values.len() as f64;
    let moment = |power: i32| values.iter().map(|v| ((v - m) / s).powi(power)).sum::<f64>() / n;

    BasicStatistics {
        count: values.len(),
        mean: m,
        median: median(values),
        std: s,
        variance: variance(values),
        min,
        max,
        range: max - min,
        skewness: if s == 0.0 { 0.0 } else { moment(3) },
        kurtosis: if s == 0.0 { 0.0 } else { moment(4) - 3.0 },
        coefficient_of_variation: if m == 0.0 { 0.0 } else { s / m.abs() },
    }
}

// ── Time domain ─────────────────────────────────────────────────────

/// Population standard deviation of relative returns
/// `(x_i − x_{i−1}) / |x_{i−1}|`, skipping zero denominators.
#[must_use]
pub fn volatility(values: &[f64]) -> f64 {
    let returns: Vec<f64> = values
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0].abs())
        .collect();
    std_dev(&returns)
}

/// Autocorrelation at `lag`, normalized by the full-series variance sum.
#[must_use]
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if values.len() <= lag {
        return 0.0;
    }
    let m = mean(values);
    let numerator: f64 = values
        .iter()
        .zip(&values[lag..])
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// `(last − first) / span`, in metres per day.
#[must_use]
pub fn displacement_rate(values: &[f64], first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let (Some(a), Some(b)) = (values.first(), values.last()) else {
        return 0.0;
    };
    let days = (last - first).num_milliseconds() as f64 / 86_400_000.0;
    if values.len() < 2 || days <= 0.0 {
        0.0
    } else {
        (b - a) / days
    }
}

/// Time-domain features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDomainFeatures {
    /// Least-squares slope per sample.
    pub trend: f64,
    /// Volatility of relative returns.
    pub volatility: f64,
    /// Lag-1 autocorrelation.
    pub autocorrelation: f64,
    /// Net displacement per day.
    pub displacement_rate: f64,
}

// ── Shape ───────────────────────────────────────────────────────────

/// Compares the means of the `w` samples before and after each index,
/// `w = max(5, len / 10)`, and reports shifts larger than `threshold`.
#[must_use]
pub fn change_points(values: &[f64], threshold: f64) -> Vec<ChangePoint> {
    let window = MIN_CHANGE_POINT_WINDOW.max(values.len() / 10);
    if values.len() < 2 * window {
        return Vec::new();
    }

    (window..values.len() - window)
        .filter_map(|i| {
            let before = mean(&values[i - window..i]);
            let after = mean(&values[i..i + window]);
            let change = (after - before).abs();
            (change > threshold).then(|| ChangePoint {
                index: i,
                change,
                direction: if after > before {
                    ChangeDirection::Increase
                } else {
                    ChangeDirection::Decrease
                },
            })
        })
        .collect()
}

/// Strict three-point local maxima.
#[must_use]
pub fn peaks(values: &[f64]) -> Vec<SeriesExtremum> {
    local_extrema(values, |prev, x, next| x > prev && x > next)
}

/// Strict three-point local minima.
#[must_use]
pub fn valleys(values: &[f64]) -> Vec<SeriesExtremum> {
    local_extrema(values, |prev, x, next| x < prev && x < next)
}

fn local_extrema(values: &[f64], test: impl Fn(f64, f64, f64) -> bool) -> Vec<SeriesExtremum> {
    values
        .windows(3)
        .enumerate()
        .filter(|(_, w)| test(w[0], w[1], w[2]))
        .map(|(i, w)| SeriesExtremum {
            index: i + 1,
            value: w[1],
        })
        .collect()
}

// ── Trend and indicators ────────────────────────────────────────────

/// Half-split trend estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    /// Direction of the change between halves.
    pub direction: TrendDirection,
    /// `|mean(second half) − mean(first half)|`.
    pub magnitude: f64,
    /// Fixed confidence of the estimate.
    pub confidence: f64,
}

/// Compares the means of the two halves of the series, split at `n / 2`.
#[must_use]
pub fn analyze_trend(values: &[f64]) -> TrendAnalysis {
    if values.len() < 2 {
        return TrendAnalysis {
            direction: TrendDirection::Stable,
            magnitude: 0.0,
            confidence: SHORT_TREND_CONFIDENCE,
        };
    }

    let (first, second) = values.split_at(values.len() / 2);
    let (a, b) = (mean(first), mean(second));
    let direction = if b > a {
        TrendDirection::Increasing
    } else if b < a {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    TrendAnalysis {
        direction,
        magnitude: (b - a).abs(),
        confidence: TREND_CONFIDENCE,
    }
}

/// A qualitative warning sign raised by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskIndicator {
    /// Maximum displacement exceeds the level IV (blue) threshold.
    BlueThresholdExceeded,
    /// Displacement varies strongly.
    HighVariability,
}

/// Headline numbers for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    /// Largest displacement.
    pub max_displacement: f64,
    /// Mean displacement.
    pub mean: f64,
    /// Least-squares slope per sample.
    pub trend: f64,
    /// Standard deviation.
    pub variability: f64,
    /// Raised indicators.
    pub indicators: Vec<RiskIndicator>,
}

/// Every feature of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    /// Descriptive statistics.
    pub statistics: BasicStatistics,
    /// Time-domain features.
    pub time_domain: TimeDomainFeatures,
    /// Dominant frequency in cycles per sample.
    pub dominant_frequency: f64,
    /// Detected mean shifts.
    pub change_points: Vec<ChangePoint>,
    /// Local maxima.
    pub peaks: Vec<SeriesExtremum>,
    /// Local minima.
    pub valleys: Vec<SeriesExtremum>,
    /// Headline numbers.
    pub summary: FeatureSummary,
}

/// Extracts every feature of a cleaned displacement series.
#[must_use]
pub fn extract(points: &[DisplacementPoint], config: &FeatureConfig) -> FeatureSet {
    let values: Vec<f64> = points.iter().map(|p| p.distance_3d).collect();
    let statistics = basic_statistics(&values);

    let rate = match (points.first(), points.last()) {
        (Some(first), Some(last)) => displacement_rate(&values, first.timestamp, last.timestamp),
        _ => 0.0,
    };
    let time_domain = TimeDomainFeatures {
        trend: linear_slope(&values),
        volatility: volatility(&values),
        autocorrelation: autocorrelation(&values, 1),
        displacement_rate: rate,
    };

    let mut indicators = Vec::new();
    if statistics.max > config.blue_threshold {
        indicators.push(RiskIndicator::BlueThresholdExceeded);
    }
    if statistics.std > config.volatility_indicator_std {
        indicators.push(RiskIndicator::HighVariability);
    }

    FeatureSet {
        dominant_frequency: dominant_frequency(&values),
        change_points: change_points(&values, config.change_point_threshold),
        peaks: peaks(&values),
        valleys: valleys(&values),
        summary: FeatureSummary {
            max_displacement: if values.is_empty() { 0.0 } else { statistics.max },
            mean: statistics.mean,
            trend: time_domain.trend,
            variability: statistics.std,
            indicators,
        },
        statistics,
        time_domain,
    }
}
