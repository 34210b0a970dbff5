//! Position fix storage.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gps_deform_models::PositionFix;
use serde::{Deserialize, Serialize};

/// Errors from a [`PositionStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An in-memory lock was poisoned by a panicking writer.
    #[error("Position store lock poisoned")]
    Poisoned,

    /// The backing store failed.
    #[error("Position store error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Which fixes to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    /// Most recent fixes to return.
    pub limit: usize,
    pub time_range: Option<TimeRange>,
}

/// Source of raw position fixes.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Returns up to `query.limit` of the device's most recent fixes inside
    /// the time range. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the fixes cannot be read.
    async fn fetch_positions(
        &self,
        device_id: &str,
        query: &FetchQuery,
    ) -> Result<Vec<PositionFix>, StoreError>;
}

/// In-memory [`PositionStore`].
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    fixes: RwLock<BTreeMap<String, Vec<PositionFix>>>,
}

impl MemoryPositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends fixes for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn insert(
        &self,
        device_id: &str,
        fixes: impl IntoIterator<Item = PositionFix>,
    ) -> Result<(), StoreError> {
        let mut all = self.fixes.write().map_err(|_| StoreError::Poisoned)?;
        all.entry(device_id.to_string()).or_default().extend(fixes);
        Ok(())
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn fetch_positions(
        &self,
        device_id: &str,
        query: &FetchQuery,
    ) -> Result<Vec<PositionFix>, StoreError> {
        let all = self.fixes.read().map_err(|_| StoreError::Poisoned)?;
        let Some(fixes) = all.get(device_id) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<PositionFix> = fixes
            .iter()
            .filter(|fix| query.time_range.is_none_or(|range| range.contains(fix.timestamp)))
            .cloned()
            .collect();
        selected.sort_by_key(|fix| std::cmp::Reverse(fix.timestamp));
        selected.truncate(query.limit);
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn fix(hour: i64) -> PositionFix {
        PositionFix {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
            latitude: 22.6847,
            longitude: 110.1893,
            source_id: "gnss-01".to_string(),
            reported_confidence: None,
            horizontal_accuracy: None,
        }
    }

    #[tokio::test]
    async fn fetch_returns_most_recent_within_limit() {
        let store = MemoryPositionStore::new();
        store.insert("d1", (0..10).map(fix)).unwrap();

        let query = FetchQuery {
            limit: 3,
            time_range: None,
        };
        let fixes = store.fetch_positions("d1", &query).await.unwrap();
        let hours: Vec<i64> = fixes.iter().map(|f| (f.timestamp - fix(0).timestamp).num_hours()).collect();
        assert_eq!(hours, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn fetch_honours_time_range() {
        let store = MemoryPositionStore::new();
        store.insert("d1", (0..10).map(fix)).unwrap();

        let query = FetchQuery {
            limit: 100,
            time_range: Some(TimeRange {
                start: fix(2).timestamp,
                end: fix(4).timestamp,
            }),
        };
        assert_eq!(store.fetch_positions("d1", &query).await.unwrap().len(), 3);
        assert!(store.fetch_positions("other", &query).await.unwrap().is_empty());
    }
}
