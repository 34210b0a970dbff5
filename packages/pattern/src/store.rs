//! Pattern library storage.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use gps_deform_models::DeformationPattern;

/// Errors from a [`PatternStore`].
#[derive(Debug, thiserror::Error)]
pub enum PatternStoreError {
    /// A lock guarding the library was poisoned by a panicking writer.
    #[error("Pattern store lock poisoned")]
    Poisoned,

    /// No pattern with the requested id exists.
    #[error("Pattern not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },
}

/// In-place modification applied to a stored pattern.
pub type PatternUpdate = Box<dyn FnOnce(&mut DeformationPattern) + Send>;

/// Storage for the deformation pattern library.
///
/// Reads hand out shared snapshots. Implementations must serialize
/// [`PatternStore::update`] calls for the same id so that concurrent
/// read-modify-write cycles never lose an update.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Returns the pattern with `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`PatternStoreError::Poisoned`] if the library is unreadable.
    async fn get(&self, id: &str) -> Result<Option<Arc<DeformationPattern>>, PatternStoreError>;

    /// Inserts or replaces a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternStoreError::Poisoned`] if the library is unwritable.
    async fn put(&self, pattern: DeformationPattern) -> Result<(), PatternStoreError>;

    /// Lists patterns applicable to `device_id` (device-specific or global),
    /// or every pattern when `device_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternStoreError::Poisoned`] if the library is unreadable.
    async fn list(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<Arc<DeformationPattern>>, PatternStoreError>;

    /// Applies `update` to the pattern with `id` and returns the new
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PatternStoreError::NotFound`] if there is no such pattern.
    async fn update(
        &self,
        id: &str,
        update: PatternUpdate,
    ) -> Result<Arc<DeformationPattern>, PatternStoreError>;
}

/// In-memory [`PatternStore`] with per-id write locks.
#[derive(Debug, Default)]
pub struct MemoryPatternStore {
    patterns: RwLock<BTreeMap<String, Arc<DeformationPattern>>>,
    write_locks: Mutex<BTreeMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryPatternStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `patterns`.
    #[must_use]
    pub fn with_patterns(patterns: impl IntoIterator<Item = DeformationPattern>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        Self {
            patterns: RwLock::new(patterns),
            write_locks: Mutex::default(),
        }
    }

    fn write_lock(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, PatternStoreError> {
        let mut locks = self
            .write_locks
            .lock()
            .map_err(|_| PatternStoreError::Poisoned)?;
        Ok(locks.entry(id.to_string()).or_default().clone())
    }

    fn snapshot(&self, id: &str) -> Result<Option<Arc<DeformationPattern>>, PatternStoreError> {
        let patterns = self
            .patterns
            .read()
            .map_err(|_| PatternStoreError::Poisoned)?;
        Ok(patterns.get(id).cloned())
    }

    fn store(&self, pattern: Arc<DeformationPattern>) -> Result<(), PatternStoreError> {
        let mut patterns = self
            .patterns
            .write()
            .map_err(|_| PatternStoreError::Poisoned)?;
        patterns.insert(pattern.id.clone(), pattern);
        Ok(())
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn get(&self, id: &str) -> Result<Option<Arc<DeformationPattern>>, PatternStoreError> {
        self.snapshot(id)
    }

    async fn put(&self, pattern: DeformationPattern) -> Result<(), PatternStoreError> {
        let lock = self.write_lock(&pattern.id)?;
        let _guard = lock.lock().await;
        self.store(Arc::new(pattern))
    }

    async fn list(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<Arc<DeformationPattern>>, PatternStoreError> {
        let patterns = self
            .patterns
            .read()
            .map_err(|_| PatternStoreError::Poisoned)?;
        Ok(patterns
            .values()
            .filter(|p| device_id.is_none_or(|id| p.applies_to(id)))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        id: &str,
        update: PatternUpdate,
    ) -> Result<Arc<DeformationPattern>, PatternStoreError> {
        let lock = self.write_lock(id)?;
        let _guard = lock.lock().await;

        let current = self
            .snapshot(id)?
            .ok_or_else(|| PatternStoreError::NotFound { id: id.to_string() })?;
        let mut next = (*current).clone();
        update(&mut next);
        let next = Arc::new(next);
        self.store(next.clone())?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use gps_deform_models::{PatternKind, PatternSource, RiskLevel};

    use super::*;

    fn pattern(id: &str, device_id: Option<&str>) -> DeformationPattern {
        DeformationPattern {
            id: id.to_string(),
            device_id: device_id.map(str::to_string),
            sequence: vec![0.0; 4],
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

    #[tokio::test]
    async fn list_filters_by_device() {
        let store = MemoryPatternStore::with_patterns([
            pattern("global", None),
            pattern("mine", Some("dev-1")),
            pattern("theirs", Some("dev-2")),
        ]);
        let ids: Vec<String> = store
            .list(Some("dev-1"))
            .await
            .unwrap()
            .iter()
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(ids, vec!["global".to_string(), "mine".to_string()]);
        assert_eq!(store.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_of_missing_pattern_fails() {
        let store = MemoryPatternStore::new();
        let err = store
            .update("nope", Box::new(|p| p.update_count += 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PatternStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn snapshots_are_not_affected_by_later_updates() {
        let store = MemoryPatternStore::with_patterns([pattern("p", None)]);
        let before = store.get("p").await.unwrap().unwrap();
        store
            .update("p", Box::new(|p| p.sequence[0] = 1.0))
            .await
            .unwrap();
        assert!(before.sequence[0].abs() < f64::EPSILON);
        let after = store.get("p").await.unwrap().unwrap();
        assert!((after.sequence[0] - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let store = Arc::new(MemoryPatternStore::with_patterns([pattern("p", None)]));
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(
                            "p",
                            Box::new(|p| {
                                p.update_count += 1;
                                p.sequence[0] += 1.0;
                            }),
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let stored = store.get("p").await.unwrap().unwrap();
        assert_eq!(stored.update_count, 64);
        assert!((stored.sequence[0] - 64.0).abs() < f64::EPSILON);
    }
}
