#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Short- and long-horizon displacement forecasting.
//!
//! The series is standardized once, handed to each [`Forecaster`] on its own
//! blocking task, and the member outputs are combined with weights
//! proportional to their validation r². The combined forecast is
//! de-standardized once, wrapped in confidence bands, and graded by
//! [`risk::assess`]. A member that cannot fit is replaced by a flat forecast
//! at the series mean and marks the ensemble degraded.

pub mod autoregressive;
pub mod regression;
pub mod risk;
pub mod trend;

use std::sync::Arc;

use gps_deform_signal::{SeededRng, mean, std_dev};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use autoregressive::Autoregressive;
pub use regression::LinearFeatureRegression;
pub use risk::{PredictionRisk, RiskGrade, RiskThresholds};
pub use trend::RecencyWeightedTrend;

const Z_95: f64 = 1.96;
const FLAT_SHORT_CONFIDENCE: f64 = 0.3;
const FLAT_LONG_CONFIDENCE: f64 = 0.2;
const MAX_SHORT_CONFIDENCE: f64 = 0.95;
const MAX_LONG_CONFIDENCE: f64 = 0.9;

/// Why a forecaster could not produce a forecast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelFitError {
    /// The series is too short for this model.
    #[error("Insufficient history: need {required} samples, got {actual}")]
    InsufficientHistory {
        /// Minimum number of samples.
        required: usize,
        /// Number of samples supplied.
        actual: usize,
    },

    /// The model produced a non-finite value.
    #[error("Forecast produced non-finite values")]
    NonFinite,
}

/// Ensemble parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ForecastConfig {
    pub short_horizon: usize,
    pub long_horizon: usize,
    /// Fraction of training samples held out for validation.
    pub validation_split: f64,
    pub trend_window: usize,
    pub regression_window: usize,
    pub regression_epochs: usize,
    pub learning_rate: f64,
    pub max_arma_order: usize,
    pub risk_thresholds: RiskThresholds,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            short_horizon: 24,
            long_horizon: 168,
            validation_split: 0.2,
            trend_window: 30,
            regression_window: 10,
            regression_epochs: 50,
            learning_rate: 0.001,
            max_arma_order: 3,
            risk_thresholds: RiskThresholds::default(),
        }
    }
}

/// Per-member inputs besides the series.
#[derive(Debug, Clone)]
pub struct ForecastContext {
    pub short_horizon: usize,
    pub long_horizon: usize,
    pub validation_split: f64,
    /// Stream for the stochastic long-horizon terms.
    pub rng: SeededRng,
}

impl ForecastContext {
    /// Default horizons and split with a generator seeded from `seed`.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self {
            short_horizon: 24,
            long_horizon: 168,
            validation_split: 0.2,
            rng: SeededRng::new(seed),
        }
    }

    fn for_member(config: &ForecastConfig, seed: u32, member: u32) -> Self {
        Self {
            short_horizon: config.short_horizon,
            long_horizon: config.long_horizon,
            validation_split: config.validation_split,
            rng: SeededRng::stream(seed, member),
        }
    }
}

/// Number of leading samples used for training when `len` samples are
/// split with `validation_split` held out.
#[must_use]
pub fn split_point(len: usize, validation_split: f64) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let train = (len as f64 * (1.0 - validation_split)).floor() as usize;
    train.min(len)
}

/// Output of one forecaster, in standardized units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberForecast {
    pub name: String,
    pub short_term: Vec<f64>,
    pub long_term: Vec<f64>,
    pub short_confidence: f64,
    pub long_confidence: f64,
    /// Validation r²; 0 when there was nothing to validate against.
    pub r2: f64,
    pub mse: f64,
    pub mae: f64,
    /// `true` if this is the flat fallback.
    pub degraded: bool,
    /// Variance-ratio stationarity, for members that test it.
    #[serde(default)]
    pub stationary: Option<bool>,
}

impl MemberForecast {
    /// Forecast at the series mean (0 in standardized units).
    #[must_use]
    pub fn flat(name: &str, ctx: &ForecastContext) -> Self {
        Self {
            name: name.to_string(),
            short_term: vec![0.0; ctx.short_horizon],
            long_term: vec![0.0; ctx.long_horizon],
            short_confidence: FLAT_SHORT_CONFIDENCE,
            long_confidence: FLAT_LONG_CONFIDENCE,
            r2: 0.0,
            mse: 0.0,
            mae: 0.0,
            degraded: true,
            stationary: None,
        }
    }

    fn is_finite(&self) -> bool {
        self.short_term
            .iter()
            .chain(&self.long_term)
            .chain([&self.short_confidence, &self.long_confidence, &self.r2, &self.mse, &self.mae])
            .all(|v| v.is_finite())
    }
}

/// A forecasting model. Implementations are pure and run on a blocking
/// thread.
pub trait Forecaster: Send + Sync {
    /// Stable identifier reported with the member output.
    fn name(&self) -> &'static str;

    /// Forecasts both horizons of a standardized series.
    ///
    /// # Errors
    ///
    /// Returns [`ModelFitError`] if the model cannot be fitted.
    fn forecast(
        &self,
        series: &[f64],
        ctx: &ForecastContext,
    ) -> Result<MemberForecast, ModelFitError>;
}

/// The three ensemble members configured from `config`.
#[must_use]
pub fn default_members(config: &ForecastConfig) -> Vec<Arc<dyn Forecaster>> {
    vec![
        Arc::new(RecencyWeightedTrend {
            window: config.trend_window,
        }),
        Arc::new(LinearFeatureRegression {
            window: config.regression_window,
            epochs: config.regression_epochs,
            learning_rate: config.learning_rate,
        }),
        Arc::new(Autoregressive {
            max_order: config.max_arma_order,
        }),
    ]
}

// ── Standardization ─────────────────────────────────────────────────

/// `(x − mean) / std`, with `std = 1` for a constant series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standardizer {
    pub mean: f64,
    pub std: f64,
}

impl Standardizer {
    #[must_use]
    pub fn fit(series: &[f64]) -> Self {
        let std = std_dev(series);
        Self {
            mean: mean(series),
            std: if std == 0.0 { 1.0 } else { std },
        }
    }

    #[must_use]
    pub fn apply(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|v| (v - self.mean) / self.std).collect()
    }

    #[must_use]
    pub fn invert(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|v| v.mul_add(self.std, self.mean)).collect()
    }
}

// ── Ensemble ────────────────────────────────────────────────────────

/// How the reported forecast was produced.
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
pub enum ForecastMethod {
    /// r²-weighted average of the members
    WeightedEnsemble,
    /// Every member failed; the forecast is the series mean
    Flat,
}

/// One horizon of the combined forecast, in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub values: Vec<f64>,
    pub confidence: f64,
    pub method: ForecastMethod,
}

/// A forecast value with its 95% interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandPoint {
    pub lower: f64,
    pub upper: f64,
    pub prediction: f64,
}

/// 95% confidence bands around both horizons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceBands {
    pub short_term: Vec<BandPoint>,
    pub long_term: Vec<BandPoint>,
    /// Population std of one-step absolute changes of the input series.
    pub error_std: f64,
    pub confidence_level: f64,
}

impl ConfidenceBands {
    /// Short band `±1.96·σ`; long band widens by 10% of `σ` per step.
    #[must_use]
    pub fn around(series: &[f64], short_term: &[f64], long_term: &[f64]) -> Self {
        let steps: Vec<f64> = series.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        let error_std = std_dev(&steps);
        let band = |value: f64, width: f64| BandPoint {
            lower: value - width,
            upper: value + width,
            prediction: value,
        };

        Self {
            short_term: short_term
                .iter()
                .map(|v| band(*v, Z_95 * error_std))
                .collect(),
            long_term: long_term
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    #[allow(clippy::cast_precision_loss)]
                    let widening = 0.1f64.mul_add(i as f64, 1.0);
                    band(*v, Z_95 * error_std * widening)
                })
                .collect(),
            error_std,
            confidence_level: 0.95,
        }
    }
}

/// Member performance as reported alongside the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub name: String,
    pub weight: f64,
    pub r2: f64,
    pub mse: f64,
    pub mae: f64,
    pub short_confidence: f64,
    pub long_confidence: f64,
    pub degraded: bool,
    #[serde(default)]
    pub stationary: Option<bool>,
}

/// Complete ensemble output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleForecast {
    pub short_term: ForecastResult,
    pub long_term: ForecastResult,
    pub members: Vec<MemberSummary>,
    pub bands: ConfidenceBands,
    pub risk: PredictionRisk,
    pub normalization: Standardizer,
    /// `true` if any member fell back to the flat forecast.
    pub degraded: bool,
}

impl EnsembleForecast {
    /// Largest absolute value over both horizons, in metres.
    #[must_use]
    pub fn max_displacement(&self) -> f64 {
        gps_deform_signal::max_abs(&self.short_term.values)
            .max(gps_deform_signal::max_abs(&self.long_term.values))
    }
}

/// Member weights proportional to `max(0, r²)`, equal when all are zero.
#[must_use]
pub fn member_weights(members: &[MemberForecast]) -> Vec<f64> {
    let scores: Vec<f64> = members.iter().map(|m| m.r2.max(0.0)).collect();
    let total: f64 = scores.iter().sum();
    if total == 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let equal = 1.0 / members.len().max(1) as f64;
        vec![equal; members.len()]
    } else {
        scores.iter().map(|s| s / total).collect()
    }
}

fn weighted_average(series: &[&[f64]], weights: &[f64]) -> Vec<f64> {
    let steps = series.iter().map(|s| s.len()).max().unwrap_or(0);
    (0..steps)
        .map(|step| {
            let (sum, total) = series.iter().zip(weights).fold(
                (0.0, 0.0),
                |(sum, total), (values, w)| match values.get(step) {
                    Some(v) => (w.mul_add(*v, sum), total + w),
                    None => (sum, total),
                },
            );
            if total > 0.0 { sum / total } else { 0.0 }
        })
        .collect()
}

fn run_member(
    forecaster: &dyn Forecaster,
    series: &[f64],
    ctx: &ForecastContext,
) -> MemberForecast {
    let result = forecaster
        .forecast(series, ctx)
        .and_then(|m| if m.is_finite() { Ok(m) } else { Err(ModelFitError::NonFinite) });
    match result {
        Ok(member) => member,
        Err(e) => {
            log::warn!("Forecaster {} failed, using flat forecast: {e}", forecaster.name());
            MemberForecast::flat(forecaster.name(), ctx)
        }
    }
}

/// Combines member forecasts (standardized) into the de-standardized
/// ensemble for `series` (metres).
#[must_use]
pub fn combine(
    series: &[f64],
    scale: Standardizer,
    members: &[MemberForecast],
    thresholds: RiskThresholds,
) -> EnsembleForecast {
    let weights = member_weights(members);
    let short: Vec<&[f64]> = members.iter().map(|m| m.short_term.as_slice()).collect();
    let long: Vec<&[f64]> = members.iter().map(|m| m.long_term.as_slice()).collect();
    let short_values = scale.invert(&weighted_average(&short, &weights));
    let long_values = scale.invert(&weighted_average(&long, &weights));

    let short_confidence: f64 = members
        .iter()
        .zip(&weights)
        .map(|(m, w)| w * m.short_confidence)
        .sum();
    let long_confidence: f64 = members
        .iter()
        .zip(&weights)
        .map(|(m, w)| w * m.long_confidence)
        .sum();

    let method = if members.iter().all(|m| m.degraded) {
        ForecastMethod::Flat
    } else {
        ForecastMethod::WeightedEnsemble
    };

    EnsembleForecast {
        bands: ConfidenceBands::around(series, &short_values, &long_values),
        risk: risk::assess(&short_values, &long_values, thresholds),
        short_term: ForecastResult {
            values: short_values,
            confidence: short_confidence.min(MAX_SHORT_CONFIDENCE),
            method,
        },
        long_term: ForecastResult {
            values: long_values,
            confidence: long_confidence.min(MAX_LONG_CONFIDENCE),
            method,
        },
        members: members
            .iter()
            .zip(&weights)
            .map(|(m, w)| MemberSummary {
                name: m.name.clone(),
                weight: *w,
                r2: m.r2,
                mse: m.mse,
                mae: m.mae,
                short_confidence: m.short_confidence,
                long_confidence: m.long_confidence,
                degraded: m.degraded,
                stationary: m.stationary,
            })
            .collect(),
        normalization: scale,
        degraded: members.iter().any(|m| m.degraded),
    }
}

/// Runs `members` concurrently on blocking tasks and combines them.
///
/// A member that fails, or whose task panics, is replaced by its flat
/// fallback.
pub async fn forecast_with(
    series: &[f64],
    config: &ForecastConfig,
    seed: u32,
    members: Vec<Arc<dyn Forecaster>>,
) -> EnsembleForecast {
    let scale = Standardizer::fit(series);
    let standardized: Arc<[f64]> = scale.apply(series).into();

    let tasks = members.into_iter().enumerate().map(|(index, forecaster)| {
        let ctx = ForecastContext::for_member(config, seed, u32::try_from(index).unwrap_or(u32::MAX));
        let standardized = standardized.clone();
        let name = forecaster.name();
        async move {
            let fallback = ctx.clone();
            tokio::task::spawn_blocking(move || run_member(forecaster.as_ref(), &standardized, &ctx))
                .await
                .unwrap_or_else(|e| {
                    log::warn!("Forecaster {name} task failed: {e}");
                    MemberForecast::flat(name, &fallback)
                })
        }
    });
    let outputs = futures::future::join_all(tasks).await;

    combine(series, scale, &outputs, config.risk_thresholds)
}

/// Forecasts `series` with the three default members.
pub async fn forecast(series: &[f64], config: &ForecastConfig, seed: u32) -> EnsembleForecast {
    forecast_with(series, config, seed, default_members(config)).await
}
