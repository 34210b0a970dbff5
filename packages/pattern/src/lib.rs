#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! DTW pattern matching against a deformation pattern library.
//!
//! The [`PatternMatcher`] ranks library patterns by DTW similarity to the
//! current displacement sequence, derives a pattern-based risk and a short
//! extrapolation from the best matches, and learns new patterns (or blends
//! near-duplicates) through an injectable [`PatternStore`].

pub mod bootstrap;
pub mod dtw;
pub mod learn;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gps_deform_models::{DeformationPattern, PatternKind, PatternSource, RiskLevel};
use gps_deform_signal::{linear_slope, mean};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub use learn::LearnOutcome;
pub use store::{MemoryPatternStore, PatternStore, PatternStoreError, PatternUpdate};

const AGE_FULL_WEIGHT_DAYS: f64 = 30.0;
const AGE_DECAY_DAYS: f64 = 100.0;
const UNDATED_AGE_WEIGHT: f64 = 0.5;
const MATCH_RISK_CONFIDENCE: f64 = 0.8;
const NO_MATCH_RISK_CONFIDENCE: f64 = 0.5;
const EXTRAPOLATION_TREND_WINDOW: usize = 5;

/// Errors from matching or learning.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// The pattern store failed.
    #[error(transparent)]
    Store(#[from] PatternStoreError),

    /// The blocking DTW task panicked or was cancelled.
    #[error("Pattern matching worker failed: {message}")]
    Worker {
        /// Join error reported by the runtime.
        message: String,
    },
}

/// Matching and learning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PatternConfig {
    /// Maximum number of library patterns compared per run.
    pub max_candidates: usize,
    /// Number of best matches reported.
    pub top_matches: usize,
    /// Fall back to the built-in bootstrap patterns when the library has
    /// no candidates for a device.
    pub bootstrap: bool,
    /// Similarity above which a learned sequence is blended into an
    /// existing pattern instead of creating a new one.
    pub blend_similarity: f64,
    /// Weight of the new sequence when blending.
    pub blend_weight: f64,
    /// Minimum sequence length worth learning.
    pub min_learn_length: usize,
    /// Minimum mean point confidence worth learning.
    pub min_learn_confidence: f64,
    /// Minimum value range worth learning, in metres.
    pub min_learn_range: f64,
    /// Maximum value range worth learning, in metres.
    pub max_learn_range: f64,
    /// Minimum absolute trend worth learning, in metres per sample.
    pub min_learn_trend: f64,
    /// Mean-shift threshold used when counting change points of a learned
    /// pattern, in metres.
    pub change_point_threshold: f64,
    /// Upper bound on the extrapolation length.
    pub max_extrapolation_steps: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            max_candidates: 100,
            top_matches: 10,
            bootstrap: true,
            blend_similarity: 0.9,
            blend_weight: 0.3,
            min_learn_length: 20,
            min_learn_confidence: 0.7,
            min_learn_range: 0.001,
            max_learn_range: 10.0,
            min_learn_trend: 1e-5,
            change_point_threshold: 0.002,
            max_extrapolation_steps: 10,
        }
    }
}

// ── Result types ────────────────────────────────────────────────────

/// One library pattern ranked against the current sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub pattern_id: String,
    pub distance: f64,
    pub similarity: f64,
    /// `1/(1 + distance) × age weight × quality`.
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub kind: PatternKind,
    pub source: PatternSource,
}

/// Aggregate similarity over the top matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilaritySummary {
    pub average_similarity: f64,
    pub max_similarity: f64,
    pub pattern_count: usize,
}

/// Risk level suggested by the matched patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRisk {
    pub level: RiskLevel,
    pub confidence: f64,
    pub description: String,
}

/// How the pattern-based extrapolation was produced.
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
pub enum ExtrapolationMethod {
    /// Linear continuation of the recent trend, backed by matches
    PatternBasedLinear,
    /// Nothing matched, so nothing was extrapolated
    NoPatterns,
}

/// Short linear continuation of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternExtrapolation {
    pub values: Vec<f64>,
    pub steps: usize,
    /// Similarity of the best match.
    pub confidence: f64,
    pub method: ExtrapolationMethod,
}

/// Everything the matcher reports for one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatchResult {
    /// Best matches, most similar first.
    pub top_matches: Vec<PatternMatch>,
    pub summary: SimilaritySummary,
    pub risk: PatternRisk,
    /// Mean similarity of the top matches.
    pub accuracy: f64,
    pub extrapolation: PatternExtrapolation,
    /// Number of library patterns compared.
    pub candidates: usize,
    /// `true` if the built-in bootstrap patterns stood in for an empty
    /// library.
    pub used_bootstrap: bool,
}

// ── Scoring ─────────────────────────────────────────────────────────

/// Weight for how recently a pattern was created or updated: 1 within 30
/// days, then `exp(−(days − 30)/100)`; 0.5 when undated.
#[must_use]
pub fn age_weight(touched: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(touched) = touched else {
        return UNDATED_AGE_WEIGHT;
    };
    #[allow(clippy::cast_precision_loss)]
    let days = (now - touched).num_milliseconds() as f64 / 86_400_000.0;
    if days <= AGE_FULL_WEIGHT_DAYS {
        1.0
    } else {
        (-(days - AGE_FULL_WEIGHT_DAYS) / AGE_DECAY_DAYS).exp()
    }
}

/// `1/(1 + distance) × age weight × quality`.
#[must_use]
pub fn match_confidence(distance: f64, pattern: &DeformationPattern, now: DateTime<Utc>) -> f64 {
    1.0 / (1.0 + distance) * age_weight(pattern.last_touched(), now) * pattern.quality
}

/// Scores every candidate against `sequence` and keeps the `top` most
/// similar, best first.
#[must_use]
pub fn rank_matches(
    sequence: &[f64],
    candidates: &[Arc<DeformationPattern>],
    top: usize,
    now: DateTime<Utc>,
) -> Vec<PatternMatch> {
    let mut matches: Vec<PatternMatch> = candidates
        .iter()
        .map(|pattern| {
            let distance = dtw::dtw_distance(sequence, &pattern.sequence);
            PatternMatch {
                pattern_id: pattern.id.clone(),
                distance,
                similarity: dtw::similarity(distance, sequence.len(), pattern.sequence.len()),
                confidence: match_confidence(distance, pattern, now),
                risk_level: pattern.risk_level,
                kind: pattern.kind,
                source: pattern.source,
            }
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches.truncate(top);
    matches
}

/// Averages the matched risk on the severity scale.
#[must_use]
pub fn pattern_risk(matches: &[PatternMatch]) -> PatternRisk {
    if matches.is_empty() {
        return PatternRisk {
            level: RiskLevel::Normal,
            confidence: NO_MATCH_RISK_CONFIDENCE,
            description: "no historical patterns to compare against".to_string(),
        };
    }

    let severities: Vec<f64> = matches
        .iter()
        .map(|m| f64::from(m.risk_level.severity()))
        .collect();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let severity = mean(&severities).round() as u8;

    PatternRisk {
        level: RiskLevel::from_severity(severity),
        confidence: MATCH_RISK_CONFIDENCE,
        description: format!("based on {} similar patterns", matches.len()),
    }
}

/// Continues the last few samples linearly for `min(max_steps, 0.2·len)`
/// steps. Nothing is extrapolated without matches.
#[must_use]
pub fn extrapolate(
    sequence: &[f64],
    matches: &[PatternMatch],
    max_steps: usize,
) -> PatternExtrapolation {
    let (Some(best), Some(&last)) = (matches.first(), sequence.last()) else {
        return PatternExtrapolation {
            values: Vec::new(),
            steps: 0,
            confidence: 0.0,
            method: ExtrapolationMethod::NoPatterns,
        };
    };

    let steps = max_steps.min(sequence.len() / 5);
    let recent = &sequence[sequence.len().saturating_sub(EXTRAPOLATION_TREND_WINDOW)..];
    let trend = linear_slope(recent);
    let values = (1..=steps)
        .map(|s| {
            #[allow(clippy::cast_precision_loss)]
            let s = s as f64;
            trend.mul_add(s, last)
        })
        .collect();

    PatternExtrapolation {
        values,
        steps,
        confidence: best.similarity,
        method: ExtrapolationMethod::PatternBasedLinear,
    }
}

fn summarize(matches: &[PatternMatch]) -> SimilaritySummary {
    let similarities: Vec<f64> = matches.iter().map(|m| m.similarity).collect();
    SimilaritySummary {
        average_similarity: mean(&similarities),
        max_similarity: similarities.iter().copied().fold(0.0, f64::max),
        pattern_count: matches.len(),
    }
}

// ── Matcher ─────────────────────────────────────────────────────────

/// Matches sequences against, and learns into, a [`PatternStore`].
#[derive(Clone)]
pub struct PatternMatcher {
    store: Arc<dyn PatternStore>,
    config: PatternConfig,
}

impl std::fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternMatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn run_blocking<T: Send + 'static>(
    work: impl FnOnce() -> T + Send + 'static,
) -> Result<T, PatternError> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PatternError::Worker {
            message: e.to_string(),
        })
}

impl PatternMatcher {
    #[must_use]
    pub fn new(store: Arc<dyn PatternStore>, config: PatternConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn PatternStore> {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Ranks the device's patterns (device-specific and global) against
    /// `sequence`.
    ///
    /// An empty library yields the bootstrap matches, or an empty result
    /// when bootstrapping is disabled.
    ///
    /// # Errors
    ///
    /// * [`PatternError::Store`] if the library cannot be listed
    /// * [`PatternError::Worker`] if the DTW task fails
    pub async fn match_sequence(
        &self,
        device_id: &str,
        sequence: &[f64],
    ) -> Result<PatternMatchResult, PatternError> {
        let mut candidates = self.store.list(Some(device_id)).await?;
        candidates.truncate(self.config.max_candidates);

        let used_bootstrap = candidates.is_empty() && self.config.bootstrap;
        if used_bootstrap {
            log::debug!("No library patterns for {device_id}, using bootstrap patterns");
            candidates = bootstrap::bootstrap_patterns()
                .into_iter()
                .map(Arc::new)
                .collect();
        }
        let candidate_count = candidates.len();

        let owned = sequence.to_vec();
        let top = self.config.top_matches;
        let now = Utc::now();
        let matches =
            run_blocking(move || rank_matches(&owned, &candidates, top, now)).await?;

        log::debug!(
            "Matched {device_id} against {candidate_count} patterns, kept {}",
            matches.len()
        );

        Ok(PatternMatchResult {
            summary: summarize(&matches),
            risk: pattern_risk(&matches),
            accuracy: mean(&matches.iter().map(|m| m.similarity).collect::<Vec<_>>()),
            extrapolation: extrapolate(
                sequence,
                &matches,
                self.config.max_extrapolation_steps,
            ),
            top_matches: matches,
            candidates: candidate_count,
            used_bootstrap,
        })
    }

    /// Offers a sequence to the library.
    ///
    /// Sequences that fail the admission rules are skipped. A sequence whose
    /// best exact-DTW similarity exceeds `blend_similarity` is blended into
    /// that pattern; otherwise a new device pattern is created.
    ///
    /// # Errors
    ///
    /// * [`PatternError::Store`] if the library cannot be read or written
    /// * [`PatternError::Worker`] if the DTW task fails
    pub async fn learn(
        &self,
        device_id: &str,
        sequence: &[f64],
        mean_confidence: f64,
    ) -> Result<LearnOutcome, PatternError> {
        if let Some(reason) = learn::rejection_reason(sequence, mean_confidence, &self.config) {
            log::debug!("Not learning pattern for {device_id}: {reason}");
            return Ok(LearnOutcome::Skipped(reason));
        }

        let candidates = self.store.list(Some(device_id)).await?;
        let owned = sequence.to_vec();
        let best = run_blocking(move || {
            candidates
                .iter()
                .map(|pattern| {
                    let distance = dtw::exact_dtw(&owned, &pattern.sequence).distance;
                    let similarity =
                        dtw::similarity(distance, owned.len(), pattern.sequence.len());
                    (pattern.id.clone(), similarity)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
        })
        .await?;

        match best {
            Some((id, similarity)) if similarity > self.config.blend_similarity => {
                let new_sequence = sequence.to_vec();
                let weight = self.config.blend_weight;
                self.store
                    .update(
                        &id,
                        Box::new(move |pattern| {
                            learn::blend(pattern, &new_sequence, weight);
                            pattern.update_count += 1;
                            pattern.updated_at = Some(Utc::now());
                        }),
                    )
                    .await?;
                log::info!("Blended sequence from {device_id} into pattern {id} (similarity {similarity:.3})");
                Ok(LearnOutcome::Blended(id))
            }
            _ => {
                let features = learn::analyze(sequence, self.config.change_point_threshold);
                let id = format!("pattern_{device_id}_{}", Uuid::new_v4());
                let pattern = DeformationPattern {
                    id: id.clone(),
                    device_id: Some(device_id.to_string()),
                    sequence: sequence.to_vec(),
                    risk_level: learn::risk_level(&features),
                    kind: learn::classify(&features),
                    features: Some(features),
                    quality: 1.0,
                    source: PatternSource::Learned,
                    update_count: 0,
                    created_at: Some(Utc::now()),
                    updated_at: None,
                };
                self.store.put(pattern).await?;
                log::info!("Learned new pattern {id}");
                Ok(LearnOutcome::Created(id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ramp(len: usize, rate: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64;
                rate * t
            })
            .collect()
    }

    fn matcher(config: PatternConfig) -> PatternMatcher {
        PatternMatcher::new(Arc::new(MemoryPatternStore::new()), config)
    }

    fn ranked(id: &str, similarity: f64, risk_level: RiskLevel) -> PatternMatch {
        PatternMatch {
            pattern_id: id.to_string(),
            distance: 0.0,
            similarity,
            confidence: 0.0,
            risk_level,
            kind: PatternKind::Mixed,
            source: PatternSource::Learned,
        }
    }

    #[test]
    fn age_weight_decays_after_thirty_days() {
        let now = Utc::now();
        assert!((age_weight(None, now) - 0.5).abs() < f64::EPSILON);
        assert!((age_weight(Some(now - Duration::days(10)), now) - 1.0).abs() < f64::EPSILON);
        let old = age_weight(Some(now - Duration::days(130)), now);
        assert!((old - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn pattern_risk_averages_severity() {
        let matches = [
            ranked("a", 0.9, RiskLevel::Red),
            ranked("b", 0.8, RiskLevel::Yellow),
        ];
        let risk = pattern_risk(&matches);
        assert_eq!(risk.level, RiskLevel::Orange);
        assert!((risk.confidence - 0.8).abs() < f64::EPSILON);

        let none = pattern_risk(&[]);
        assert_eq!(none.level, RiskLevel::Normal);
        assert!((none.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn extrapolation_continues_recent_trend() {
        let sequence = ramp(50, 0.001);
        let out = extrapolate(&sequence, &[ranked("a", 0.95, RiskLevel::Normal)], 10);
        assert_eq!(out.method, ExtrapolationMethod::PatternBasedLinear);
        assert_eq!(out.steps, 10);
        assert!((out.values[0] - 0.050).abs() < 1e-12);
        assert!((out.values[9] - 0.059).abs() < 1e-12);
        assert!((out.confidence - 0.95).abs() < f64::EPSILON);

        let short = extrapolate(&ramp(12, 0.001), &[ranked("a", 0.5, RiskLevel::Normal)], 10);
        assert_eq!(short.steps, 2);

        let none = extrapolate(&sequence, &[], 10);
        assert_eq!(none.method, ExtrapolationMethod::NoPatterns);
        assert!(none.values.is_empty());
    }

    #[tokio::test]
    async fn empty_library_uses_bootstrap_patterns() {
        let result = matcher(PatternConfig::default())
            .match_sequence("dev-1", &ramp(50, 0.001))
            .await
            .unwrap();
        assert!(result.used_bootstrap);
        assert_eq!(result.candidates, 3);
        assert_eq!(result.top_matches.len(), 3);
        assert_eq!(result.top_matches[0].pattern_id, "linear_increase");
        assert!(result.summary.max_similarity > 0.99);
        assert_eq!(result.summary.pattern_count, 3);
        // Bootstrap patterns are undated.
        assert!(result.top_matches[0].confidence <= 0.5);
    }

    #[tokio::test]
    async fn empty_library_without_bootstrap_is_not_an_error() {
        let config = PatternConfig {
            bootstrap: false,
            ..PatternConfig::default()
        };
        let result = matcher(config)
            .match_sequence("dev-1", &ramp(50, 0.001))
            .await
            .unwrap();
        assert!(result.top_matches.is_empty());
        assert_eq!(result.risk.level, RiskLevel::Normal);
        assert_eq!(result.extrapolation.method, ExtrapolationMethod::NoPatterns);
        assert!(result.accuracy.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn learn_creates_then_blends() {
        let matcher = matcher(PatternConfig::default());
        let sequence = ramp(30, 0.001);

        let LearnOutcome::Created(id) = matcher.learn("dev-1", &sequence, 0.9).await.unwrap()
        else {
            panic!("expected a new pattern");
        };
        assert!(id.starts_with("pattern_dev-1_"));

        let stored = matcher.store().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.kind, PatternKind::Increasing);
        // Steep trend (+2) and twenty change points (+1).
        assert_eq!(stored.risk_level, RiskLevel::Orange);
        assert_eq!(stored.source, PatternSource::Learned);

        let again = matcher.learn("dev-1", &sequence, 0.9).await.unwrap();
        assert_eq!(again, LearnOutcome::Blended(id.clone()));
        let blended = matcher.store().get(&id).await.unwrap().unwrap();
        assert_eq!(blended.update_count, 1);
        assert!(blended.updated_at.is_some());

        let skipped = matcher.learn("dev-1", &sequence, 0.5).await.unwrap();
        assert!(matches!(skipped, LearnOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn device_patterns_are_not_shared() {
        let config = PatternConfig {
            bootstrap: false,
            ..PatternConfig::default()
        };
        let matcher = matcher(config);
        matcher.learn("dev-2", &ramp(30, 0.001), 0.9).await.unwrap();

        let other = matcher.match_sequence("dev-1", &ramp(30, 0.001)).await.unwrap();
        assert!(other.top_matches.is_empty());
        let own = matcher.match_sequence("dev-2", &ramp(30, 0.001)).await.unwrap();
        assert_eq!(own.top_matches.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_learning_blends_every_run() {
        let matcher = matcher(PatternConfig::default());
        let sequence = ramp(30, 0.001);
        let LearnOutcome::Created(id) = matcher.learn("dev-1", &sequence, 0.9).await.unwrap()
        else {
            panic!("expected a new pattern");
        };

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let matcher = matcher.clone();
                let sequence = sequence.clone();
                tokio::spawn(async move { matcher.learn("dev-1", &sequence, 0.9).await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(task.await.unwrap().unwrap(), LearnOutcome::Blended(_)));
        }

        let stored = matcher.store().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.update_count, 16);
    }
}
