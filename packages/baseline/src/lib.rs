#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Baseline reference resolution.
//!
//! Displacement is always measured against a fixed reference position. An
//! operator-established baseline in the [`BaselineStore`] wins; otherwise a
//! temporary baseline is averaged from the earliest fixes of the batch. The
//! temporary baseline is deterministic and never written back.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gps_deform_geodesy::{GeodesyError, validate_coordinate};
use gps_deform_models::{BaselineReference, BaselineSource, PositionFix};

/// Confidence assigned to a temporary baseline.
pub const TEMPORARY_CONFIDENCE: f64 = 0.7;
/// Default confidence of an operator-established baseline.
pub const PERSISTED_CONFIDENCE: f64 = 0.95;

const MIN_TEMPORARY_SAMPLES: usize = 10;
const MAX_TEMPORARY_SAMPLES: usize = 50;

/// Errors from baseline resolution.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// Not enough valid fixes to average a temporary baseline.
    #[error("Insufficient data for baseline: need {required}, got {actual}")]
    InsufficientData {
        /// Minimum number of valid fixes.
        required: usize,
        /// Number of valid fixes available.
        actual: usize,
    },

    /// The supplied coordinate is out of range.
    #[error(transparent)]
    InvalidCoordinate(#[from] GeodesyError),

    /// Neither a persisted nor a temporary baseline could be produced.
    #[error("No baseline available for device {device_id}")]
    NoBaseline {
        /// Device that has no baseline.
        device_id: String,
    },

    /// The backing store failed.
    #[error("Baseline store error: {message}")]
    Store {
        /// Description of what went wrong.
        message: String,
    },
}

/// Persistent storage for operator-established baselines.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Returns the stored baseline for a device, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::Store`] if the lookup fails.
    async fn fetch_baseline(&self, device_id: &str)
    -> Result<Option<BaselineReference>, BaselineError>;

    /// Inserts or replaces the baseline for a device.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::Store`] if the write fails.
    async fn persist_baseline(
        &self,
        device_id: &str,
        baseline: BaselineReference,
    ) -> Result<(), BaselineError>;
}

/// In-memory [`BaselineStore`].
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    baselines: RwLock<BTreeMap<String, BaselineReference>>,
}

impl MemoryBaselineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> BaselineError {
    BaselineError::Store {
        message: "baseline store lock poisoned".to_string(),
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn fetch_baseline(
        &self,
        device_id: &str,
    ) -> Result<Option<BaselineReference>, BaselineError> {
        let baselines = self.baselines.read().map_err(poisoned)?;
        Ok(baselines.get(device_id).cloned())
    }

    async fn persist_baseline(
        &self,
        device_id: &str,
        baseline: BaselineReference,
    ) -> Result<(), BaselineError> {
        let mut baselines = self.baselines.write().map_err(poisoned)?;
        baselines.insert(device_id.to_string(), baseline);
        Ok(())
    }
}

/// Operator input for establishing a persisted baseline.
#[derive(Debug, Clone, Default)]
pub struct BaselinePayload {
    /// Surveyed latitude.
    pub latitude: f64,
    /// Surveyed longitude.
    pub longitude: f64,
    /// Surveyed altitude in metres.
    pub altitude: Option<f64>,
    /// Operator establishing the baseline.
    pub established_by: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Confidence override, defaults to 0.95.
    pub confidence: Option<f64>,
    /// Establishment time override, defaults to now.
    pub established_at: Option<DateTime<Utc>>,
}

/// Resolves the reference position for a device.
#[derive(Clone)]
pub struct BaselineResolver {
    store: Arc<dyn BaselineStore>,
}

impl BaselineResolver {
    /// Creates a resolver backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BaselineStore>) -> Self {
        Self { store }
    }

    /// Looks up the persisted baseline for a device.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::Store`] if the store lookup fails.
    pub async fn get_baseline(
        &self,
        device_id: &str,
    ) -> Result<Option<BaselineReference>, BaselineError> {
        self.store.fetch_baseline(device_id).await
    }

    /// Validates and stores an operator-established baseline.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::InvalidCoordinate`] for out-of-range input
    /// or [`BaselineError::Store`] if the write fails.
    pub async fn upsert_persisted_baseline(
        &self,
        device_id: &str,
        payload: BaselinePayload,
    ) -> Result<BaselineReference, BaselineError> {
        validate_coordinate(payload.latitude, payload.longitude)?;

        let baseline = BaselineReference {
            latitude: payload.latitude,
            longitude: payload.longitude,
            altitude: payload.altitude,
            established_at: payload.established_at.unwrap_or_else(Utc::now),
            established_by: payload.established_by,
            notes: payload.notes,
            confidence: payload.confidence.unwrap_or(PERSISTED_CONFIDENCE),
            sample_count: 1,
            source: BaselineSource::Persisted,
        };

        self.store
            .persist_baseline(device_id, baseline.clone())
            .await?;
        log::info!(
            "Persisted baseline for {device_id} at ({}, {})",
            baseline.latitude,
            baseline.longitude
        );

        Ok(baseline)
    }

    /// Returns the persisted baseline if present, otherwise a temporary
    /// baseline averaged from `fixes`.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::NoBaseline`] if there is no persisted
    /// baseline and no valid fixes, or [`BaselineError::Store`] if the
    /// lookup fails.
    pub async fn resolve(
        &self,
        device_id: &str,
        fixes: &[PositionFix],
    ) -> Result<BaselineReference, BaselineError> {
        if let Some(baseline) = self.get_baseline(device_id).await? {
            log::debug!("Using persisted baseline for {device_id}");
            return Ok(baseline);
        }

        match establish_temporary_baseline(fixes) {
            Ok(baseline) => {
                log::info!(
                    "No persisted baseline for {device_id}; using temporary baseline from {} fixes",
                    baseline.sample_count
                );
                Ok(baseline)
            }
            Err(BaselineError::InsufficientData { .. }) => Err(BaselineError::NoBaseline {
                device_id: device_id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Averages the earliest fixes into a temporary baseline.
///
/// Uses the first `clamp(floor(len · 0.1), 10, 50)` fixes in time order,
/// capped at the batch size, and ignores fixes with invalid coordinates.
///
/// # Errors
///
/// Returns [`BaselineError::InsufficientData`] if none of the selected
/// fixes has valid coordinates.
pub fn establish_temporary_baseline(
    fixes: &[PositionFix],
) -> Result<BaselineReference, BaselineError> {
    let mut sorted: Vec<&PositionFix> = fixes.iter().collect();
    sorted.sort_by_key(|fix| fix.timestamp);

    let take = (sorted.len() / 10)
        .clamp(MIN_TEMPORARY_SAMPLES, MAX_TEMPORARY_SAMPLES)
        .min(sorted.len());
    let valid: Vec<&PositionFix> = sorted[..take]
        .iter()
        .copied()
        .filter(|fix| fix.has_valid_coordinates())
        .collect();

    let Some(first) = sorted.first() else {
        return Err(BaselineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    };
    if valid.is_empty() {
        return Err(BaselineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let count = valid.len() as f64;
    let latitude = valid.iter().map(|fix| fix.latitude).sum::<f64>() / count;
    let longitude = valid.iter().map(|fix| fix.longitude).sum::<f64>() / count;

    Ok(BaselineReference {
        latitude,
        longitude,
        altitude: None,
        established_at: first.timestamp,
        established_by: None,
        notes: Some("temporary baseline from earliest fixes".to_string()),
        confidence: TEMPORARY_CONFIDENCE,
        sample_count: valid.len(),
        source: BaselineSource::Temporary,
    })
}
