#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GPS deformation analysis engine.
//!
//! [`Engine::analyze`] runs one request-scoped pipeline for a device:
//!
//! 1. fetch and filter position fixes (bounded by a timeout and a limit)
//! 2. resolve the baseline and build the displacement series
//! 3. clean the series
//! 4. decompose, match patterns and extract features concurrently
//! 5. forecast both horizons
//! 6. classify the risk, score data quality and learn the sequence
//!
//! Data-validity problems abort with a typed [`EngineError`]. Stage
//! failures after cleaning degrade the report instead and are listed in its
//! warnings.

pub mod config;
pub mod displacement;
pub mod progress;
pub mod quality;
pub mod store;
pub mod synthetic;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gps_deform_baseline::{BaselineError, BaselinePayload, BaselineResolver, BaselineStore};
use gps_deform_ceemd::{Decomposition, DecompositionError};
use gps_deform_features::{FeatureSet, TrendAnalysis, analyze_trend};
use gps_deform_forecast::EnsembleForecast;
use gps_deform_geodesy::GeodesyError;
use gps_deform_models::{BaselineReference, CancelFlag, PositionFix};
use gps_deform_pattern::{
    LearnOutcome, PatternError, PatternMatchResult, PatternMatcher, PatternStore,
};
use gps_deform_preprocess::{OutlierReport, PreprocessError, SmoothingMethod};
use gps_deform_risk::{DeformationTypeAssessment, RiskAssessment, RiskInputs};
use gps_deform_signal::SeededRng;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use config::{ConfigError, EngineConfig};
pub use displacement::RealTimeDisplacement;
pub use progress::{NullProgress, ProgressCallback};
pub use quality::DataQuality;
pub use store::{FetchQuery, MemoryPositionStore, PositionStore, StoreError, TimeRange};

/// Stages reported through [`ProgressCallback`].
pub const STAGES: u64 = 8;

/// Mixed into the device seed so forecast streams differ from CEEMD
/// streams.
const FORECAST_SEED_SALT: u32 = 0x5f3c_a1d7;

/// Errors from the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The position store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The position fetch did not finish in time.
    #[error("Fetching positions for {device_id} timed out after {secs}s")]
    FetchTimeout {
        /// Device whose fixes were requested.
        device_id: String,
        /// Configured timeout.
        secs: u64,
    },

    /// No fix survived validation and filtering.
    #[error("No valid positions for {device_id} ({fetched} fetched)")]
    NoValidPoints {
        /// Device whose fixes were requested.
        device_id: String,
        /// Number of fixes the store returned.
        fetched: usize,
    },

    /// The baseline could not be resolved or stored.
    #[error(transparent)]
    Baseline(#[from] BaselineError),

    /// A coordinate was out of range.
    #[error(transparent)]
    Geodesy(#[from] GeodesyError),

    /// Too few points to analyse.
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    /// Decomposition failed in a way that cannot be degraded.
    #[error(transparent)]
    Decomposition(#[from] DecompositionError),

    /// The pattern library failed.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A blocking worker panicked.
    #[error("Analysis worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },

    /// The run was cancelled.
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Per-request options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzeOptions {
    /// Most recent fixes to fetch.
    pub limit: usize,
    /// Fixes reporting a horizontal accuracy worse than this (metres) are
    /// dropped.
    pub min_accuracy: f64,
    /// Fixes reporting a confidence below this are dropped.
    pub min_confidence: f64,
    pub time_range: Option<TimeRange>,
    /// Offer the cleaned sequence to the pattern library afterwards.
    pub learn: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            limit: 200,
            min_accuracy: 10.0,
            min_confidence: 0.5,
            time_range: None,
            learn: true,
        }
    }
}

/// What cleaning did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessSummary {
    pub raw_points: usize,
    pub cleaned_points: usize,
    pub removed_outliers: OutlierReport,
    pub interpolated_count: usize,
    pub smoothing: SmoothingMethod,
}

/// Complete result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub device_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub processing_ms: u64,
    /// `true` if any stage fell back to a bounded result.
    pub degraded: bool,
    pub data_quality: DataQuality,
    pub preprocessing: PreprocessSummary,
    pub baseline: BaselineReference,
    pub real_time: Option<RealTimeDisplacement>,
    pub decomposition: Decomposition,
    /// Absent when pattern matching failed.
    pub pattern_match: Option<PatternMatchResult>,
    pub statistics: FeatureSet,
    pub trend: TrendAnalysis,
    pub forecast: EnsembleForecast,
    pub risk: RiskAssessment,
    pub deformation_type: DeformationTypeAssessment,
    /// Absent when learning was disabled or failed.
    pub learned: Option<LearnOutcome>,
    pub warnings: Vec<String>,
}

/// Projection of an [`AnalysisReport`].
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
pub enum AnalysisView {
    /// Risk, data quality and headline numbers
    Summary,
    /// Trend, statistics, decomposition and forecast
    Trend,
    /// Everything
    Full,
}

impl AnalysisView {
    const fn fields(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Summary => Some(&[
                "deviceId",
                "analyzedAt",
                "processingMs",
                "degraded",
                "dataQuality",
                "baseline",
                "realTime",
                "risk",
                "deformationType",
                "warnings",
            ]),
            Self::Trend => Some(&[
                "deviceId",
                "analyzedAt",
                "trend",
                "statistics",
                "decomposition",
                "patternMatch",
                "forecast",
            ]),
            Self::Full => None,
        }
    }
}

impl AnalysisReport {
    /// Serializes the fields selected by `view`.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized.
    pub fn view(&self, view: AnalysisView) -> Result<serde_json::Value, serde_json::Error> {
        let full = serde_json::to_value(self)?;
        Ok(match (view.fields(), full) {
            (Some(fields), serde_json::Value::Object(mut map)) => serde_json::Value::Object(
                fields.iter().filter_map(|key| map.remove_entry(*key)).collect(),
            ),
            (_, full) => full,
        })
    }
}

/// Keeps fixes with valid coordinates and acceptable reported quality,
/// sorted by time.
#[must_use]
pub fn filter_fixes(fixes: Vec<PositionFix>, options: &AnalyzeOptions) -> Vec<PositionFix> {
    let mut kept: Vec<PositionFix> = fixes
        .into_iter()
        .filter(PositionFix::has_valid_coordinates)
        .filter(|fix| {
            fix.horizontal_accuracy
                .is_none_or(|accuracy| accuracy <= options.min_accuracy)
        })
        .filter(|fix| {
            fix.reported_confidence
                .is_none_or(|confidence| confidence >= options.min_confidence)
        })
        .collect();
    kept.sort_by_key(|fix| fix.timestamp);
    kept
}

fn check_cancelled(cancel: &CancelFlag) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        log::info!("Analysis cancelled");
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

fn stage(progress: &dyn ProgressCallback, name: &str) {
    log::debug!("Stage: {name}");
    progress.set_message(name.to_string());
}

/// The analysis engine. Cheap to clone; share it behind an [`Arc`] or by
/// cloning.
#[derive(Clone)]
pub struct Engine {
    positions: Arc<dyn PositionStore>,
    baselines: BaselineResolver,
    patterns: PatternMatcher,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionStore>,
        baselines: Arc<dyn BaselineStore>,
        patterns: Arc<dyn PatternStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            positions,
            baselines: BaselineResolver::new(baselines),
            patterns: PatternMatcher::new(patterns, config.pattern.clone()),
            config: Arc::new(config),
        }
    }

    /// Analyses a device without progress reporting or cancellation.
    ///
    /// # Errors
    ///
    /// See [`Engine::analyze_with`].
    pub async fn analyze(
        &self,
        device_id: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisReport, EngineError> {
        self.analyze_with(device_id, options, &NullProgress, &CancelFlag::new())
            .await
    }

    /// Analyses a device, advancing `progress` once per stage and checking
    /// `cancel` between stages.
    ///
    /// # Errors
    ///
    /// * [`EngineError::FetchTimeout`] or [`EngineError::Store`] if the
    ///   fixes cannot be fetched
    /// * [`EngineError::NoValidPoints`] if no fix survives filtering
    /// * [`EngineError::Baseline`] if no baseline can be resolved
    /// * [`EngineError::Preprocess`] if too few points remain
    /// * [`EngineError::Cancelled`] if `cancel` fires
    pub async fn analyze_with(
        &self,
        device_id: &str,
        options: &AnalyzeOptions,
        progress: &dyn ProgressCallback,
        cancel: &CancelFlag,
    ) -> Result<AnalysisReport, EngineError> {
        let started = Instant::now();
        let config = &self.config;
        let mut warnings = Vec::new();
        let mut degraded = false;
        progress.set_total(STAGES);

        stage(progress, "Fetching positions");
        let fetched = self.fetch(device_id, options).await?;
        let total_points = fetched.len();
        let fixes = filter_fixes(fetched, options);
        if fixes.is_empty() {
            return Err(EngineError::NoValidPoints {
                device_id: device_id.to_string(),
                fetched: total_points,
            });
        }
        log::info!(
            "Analysing {device_id}: {} of {total_points} fixes usable",
            fixes.len()
        );
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Resolving baseline");
        let baseline = self.baselines.resolve(device_id, &fixes).await?;
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Building displacement");
        let series = displacement::build(&fixes, &baseline, &config.error_model)?;
        let real_time = displacement::real_time(&fixes, &baseline)?;
        warnings.extend(series.warnings);
        let raw_points = series.points.len();
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Cleaning series");
        let cleaned = gps_deform_preprocess::preprocess(series.points, &config.preprocess)?;
        let values = cleaned.values();
        let mean_confidence = cleaned.mean_confidence();
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Decomposing, matching and extracting features");
        let seed = SeededRng::device_seed(device_id);
        let feature_points = cleaned.points.clone();
        let feature_config = config.features.clone();
        let (decomposition, pattern_match, statistics) = tokio::join!(
            gps_deform_ceemd::decompose_or_degrade(
                values.clone(),
                config.ceemd.clone(),
                seed,
                cancel.clone(),
            ),
            self.patterns.match_sequence(device_id, &values),
            tokio::task::spawn_blocking(move || {
                gps_deform_features::extract(&feature_points, &feature_config)
            }),
        );

        let decomposition = match decomposition {
            Ok(decomposition) => decomposition,
            Err(DecompositionError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        if decomposition.degraded {
            degraded = true;
            warnings.push("Decomposition degraded to a single IMF".to_string());
        }
        let pattern_match = match pattern_match {
            Ok(result) => Some(result),
            Err(e) => {
                log::warn!("Pattern matching failed for {device_id}: {e}");
                degraded = true;
                warnings.push(format!("Pattern matching failed: {e}"));
                None
            }
        };
        let statistics = statistics.map_err(|e| EngineError::Worker {
            message: e.to_string(),
        })?;
        let trend = analyze_trend(&values);
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Forecasting");
        let forecast =
            gps_deform_forecast::forecast(&values, &config.forecast, seed ^ FORECAST_SEED_SALT)
                .await;
        if forecast.degraded {
            degraded = true;
            let failed: Vec<&str> = forecast
                .members
                .iter()
                .filter(|m| m.degraded)
                .map(|m| m.name.as_str())
                .collect();
            warnings.push(format!("Flat fallback used for {}", failed.join(", ")));
        }
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Classifying risk");
        let deformation_type =
            gps_deform_risk::classify_deformation_type(&cleaned.points, &config.risk);
        let risk = gps_deform_risk::assess(
            &RiskInputs {
                max_displacement: statistics.summary.max_displacement,
                trend_magnitude: trend.magnitude,
                deformation_type: deformation_type.kind,
                patterns: pattern_match.as_ref(),
                forecast: Some(&forecast),
                real_time_displacement: real_time.map(|r| r.displacement),
            },
            &config.risk,
        );
        let data_quality = quality::assess(&cleaned.points, total_points);
        check_cancelled(cancel)?;
        progress.inc(1);

        stage(progress, "Learning pattern");
        let learned = if options.learn {
            match self.learn_pattern(device_id, &values, mean_confidence).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::warn!("Pattern learning failed for {device_id}: {e}");
                    warnings.push(format!("Pattern learning failed: {e}"));
                    None
                }
            }
        } else {
            None
        };
        progress.inc(1);

        let processing_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        progress.finish(format!("{device_id}: {}", risk.label));
        log::info!(
            "Analysed {device_id} in {processing_ms} ms: {} (confidence {:.2}){}",
            risk.label,
            risk.confidence,
            if degraded { ", degraded" } else { "" }
        );

        Ok(AnalysisReport {
            device_id: device_id.to_string(),
            analyzed_at: Utc::now(),
            processing_ms,
            degraded,
            data_quality,
            preprocessing: PreprocessSummary {
                raw_points,
                cleaned_points: cleaned.points.len(),
                removed_outliers: cleaned.removed_outliers,
                interpolated_count: cleaned.interpolated_count,
                smoothing: cleaned.smoothing,
            },
            baseline,
            real_time,
            decomposition,
            pattern_match,
            statistics,
            trend,
            forecast,
            risk,
            deformation_type,
            learned,
            warnings,
        })
    }

    async fn fetch(
        &self,
        device_id: &str,
        options: &AnalyzeOptions,
    ) -> Result<Vec<PositionFix>, EngineError> {
        let query = FetchQuery {
            limit: options.limit,
            time_range: options.time_range,
        };
        let secs = self.config.engine.fetch_timeout_secs;
        tokio::time::timeout(
            Duration::from_secs(secs),
            self.positions.fetch_positions(device_id, &query),
        )
        .await
        .map_err(|_| {
            log::warn!("Position fetch for {device_id} timed out after {secs}s");
            EngineError::FetchTimeout {
                device_id: device_id.to_string(),
                secs,
            }
        })?
        .map_err(EngineError::from)
    }

    /// Offers a sequence to the device's pattern library.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Pattern`] if the library cannot be read or
    /// written.
    pub async fn learn_pattern(
        &self,
        device_id: &str,
        sequence: &[f64],
        mean_confidence: f64,
    ) -> Result<LearnOutcome, EngineError> {
        Ok(self
            .patterns
            .learn(device_id, sequence, mean_confidence)
            .await?)
    }

    /// Stores an operator-established baseline for a device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Baseline`] for an invalid coordinate or a
    /// store failure.
    pub async fn establish_baseline(
        &self,
        device_id: &str,
        payload: BaselinePayload,
    ) -> Result<BaselineReference, EngineError> {
        Ok(self
            .baselines
            .upsert_persisted_baseline(device_id, payload)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use gps_deform_baseline::MemoryBaselineStore;
    use gps_deform_models::{DeformationType, RiskLevel, TrendDirection};
    use gps_deform_pattern::MemoryPatternStore;

    use super::*;
    use crate::synthetic::{DriftScenario, drifting_fixes};

    const DEVICE: &str = "station-7";

    fn scenario() -> DriftScenario {
        DriftScenario {
            start: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            ..DriftScenario::default()
        }
    }

    fn engine_with(fixes: Vec<PositionFix>, config: EngineConfig) -> Engine {
        let positions = MemoryPositionStore::new();
        positions.insert(DEVICE, fixes).unwrap();
        Engine::new(
            Arc::new(positions),
            Arc::new(MemoryBaselineStore::new()),
            Arc::new(MemoryPatternStore::new()),
            config,
        )
    }

    async fn drifting_engine() -> Engine {
        let engine = engine_with(drifting_fixes(&scenario()), EngineConfig::embedded());
        engine
            .establish_baseline(
                DEVICE,
                BaselinePayload {
                    latitude: 22.6847,
                    longitude: 110.1893,
                    ..BaselinePayload::default()
                },
            )
            .await
            .unwrap();
        engine
    }

    #[derive(Default)]
    struct CountingProgress {
        total: AtomicU64,
        done: AtomicU64,
    }

    impl ProgressCallback for CountingProgress {
        fn set_total(&self, total: u64) {
            self.total.store(total, Ordering::SeqCst);
        }
        fn inc(&self, delta: u64) {
            self.done.fetch_add(delta, Ordering::SeqCst);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
    }

    struct SlowStore;

    #[async_trait]
    impl PositionStore for SlowStore {
        async fn fetch_positions(
            &self,
            _device_id: &str,
            _query: &FetchQuery,
        ) -> Result<Vec<PositionFix>, StoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn drifting_station_end_to_end() {
        let engine = drifting_engine().await;
        let report = engine.analyze(DEVICE, &AnalyzeOptions::default()).await.unwrap();

        let max = report.statistics.summary.max_displacement;
        assert!((max - 0.060).abs() < 0.005, "max displacement {max}");
        assert!(
            matches!(report.risk.level, RiskLevel::Red | RiskLevel::Orange),
            "risk {:?}",
            report.risk.level
        );
        assert_eq!(report.trend.direction, TrendDirection::Increasing);
        assert_eq!(report.deformation_type.kind, DeformationType::Horizontal);

        let last_cleaned = *report.decomposition.reconstruct().last().unwrap();
        assert!(report.forecast.short_term.values[23] > last_cleaned);

        assert_eq!(report.data_quality.total_points, 60);
        assert!(report.risk.confidence >= 0.3 && report.risk.confidence <= 0.95);
        assert!(report.pattern_match.as_ref().unwrap().used_bootstrap);
        assert!(matches!(report.learned, Some(LearnOutcome::Created(_))));
        assert!(report.real_time.unwrap().displacement > 0.05);
    }

    #[tokio::test]
    async fn second_run_matches_and_blends_learned_pattern() {
        let engine = drifting_engine().await;
        let options = AnalyzeOptions::default();
        let first = engine.analyze(DEVICE, &options).await.unwrap();
        let Some(LearnOutcome::Created(id)) = first.learned else {
            panic!("expected a new pattern, got {:?}", first.learned);
        };

        let second = engine.analyze(DEVICE, &options).await.unwrap();
        let matches = second.pattern_match.unwrap();
        assert!(!matches.used_bootstrap);
        assert_eq!(matches.top_matches[0].pattern_id, id);
        assert_eq!(second.learned, Some(LearnOutcome::Blended(id)));
    }

    #[tokio::test]
    async fn empty_library_without_bootstrap_is_not_an_error() {
        let mut config = EngineConfig::embedded();
        config.pattern.bootstrap = false;
        let engine = engine_with(drifting_fixes(&scenario()), config);

        let options = AnalyzeOptions {
            learn: false,
            ..AnalyzeOptions::default()
        };
        let report = engine.analyze(DEVICE, &options).await.unwrap();
        let matches = report.pattern_match.unwrap();
        assert!(matches.top_matches.is_empty());
        assert!(report.risk.factors.pattern_similarity.abs() < f64::EPSILON);
        assert!(report.learned.is_none());
        // No persisted baseline, so the earliest fixes were averaged.
        assert_eq!(report.baseline.source, gps_deform_models::BaselineSource::Temporary);
    }

    #[tokio::test]
    async fn cancelled_run_stops() {
        let engine = drifting_engine().await;
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = engine
            .analyze_with(DEVICE, &AnalyzeOptions::default(), &NullProgress, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn progress_advances_once_per_stage() {
        let engine = drifting_engine().await;
        let progress = CountingProgress::default();
        engine
            .analyze_with(DEVICE, &AnalyzeOptions::default(), &progress, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(progress.total.load(Ordering::SeqCst), STAGES);
        assert_eq!(progress.done.load(Ordering::SeqCst), STAGES);
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let mut config = EngineConfig::embedded();
        config.engine.fetch_timeout_secs = 1;
        let engine = Engine::new(
            Arc::new(SlowStore),
            Arc::new(MemoryBaselineStore::new()),
            Arc::new(MemoryPatternStore::new()),
            config,
        );
        let err = engine.analyze(DEVICE, &AnalyzeOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::FetchTimeout { secs: 1, .. }));
    }

    #[tokio::test]
    async fn unknown_device_has_no_valid_points() {
        let engine = engine_with(Vec::new(), EngineConfig::embedded());
        let err = engine.analyze("nobody", &AnalyzeOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoValidPoints { fetched: 0, .. }));
    }

    #[tokio::test]
    async fn too_few_fixes_is_insufficient_data() {
        let mut fixes = drifting_fixes(&scenario());
        fixes.truncate(5);
        let engine = engine_with(fixes, EngineConfig::embedded());
        let err = engine.analyze(DEVICE, &AnalyzeOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Preprocess(PreprocessError::InsufficientData {
                required: 10,
                actual: 5
            })
        ));
    }

    #[test]
    fn filter_drops_poor_fixes_and_sorts() {
        let mut fixes = drifting_fixes(&scenario());
        fixes.truncate(4);
        fixes.reverse();
        fixes[0].horizontal_accuracy = Some(25.0);
        fixes[1].reported_confidence = Some(0.2);
        fixes[2].latitude = f64::NAN;

        let kept = filter_fixes(fixes.clone(), &AnalyzeOptions::default());
        assert_eq!(kept, vec![fixes[3].clone()]);

        let mut sorted = filter_fixes(drifting_fixes(&scenario()), &AnalyzeOptions::default());
        sorted.reverse();
        assert!(sorted.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[tokio::test]
    async fn summary_view_projects_headline_fields() {
        let engine = drifting_engine().await;
        let options = AnalyzeOptions {
            learn: false,
            ..AnalyzeOptions::default()
        };
        let report = engine.analyze(DEVICE, &options).await.unwrap();

        let summary = report.view(AnalysisView::Summary).unwrap();
        assert!(summary.get("risk").is_some());
        assert!(summary.get("forecast").is_none());
        assert_eq!(summary["deviceId"], DEVICE);

        let trend = report.view(AnalysisView::Trend).unwrap();
        assert!(trend.get("forecast").is_some());
        assert!(trend.get("risk").is_none());

        let full = report.view(AnalysisView::Full).unwrap();
        assert!(full.get("learned").is_some());
        assert!("trend".parse::<AnalysisView>().is_ok());
    }
}
