use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, StoredReading, TelemetryStore};
use crate::telemetry::NewReading;

/// Process-local, non-durable store.
///
/// Wrapped in `Arc` so clones share the same log. Readers never block each
/// other; an append holds the write lock only for the push.
#[derive(Clone, Default)]
pub struct MemoryTelemetryStore {
    inner: Arc<RwLock<Vec<StoredReading>>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn open(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(&self, reading: NewReading) -> Result<StoredReading, StoreError> {
        let mut log = self.inner.write().await;
        // Keep created_at non-decreasing even if the wall clock steps back.
        let now = Utc::now();
        let created_at = log.last().map_or(now, |last| last.created_at.max(now));
        let stored = StoredReading::from_new(Uuid::new_v4(), created_at, reading);
        log.push(stored.clone());
        Ok(stored)
    }

    async fn latest_by_device(&self, device_id: &str) -> Result<Option<StoredReading>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.device_id == device_id)
            .cloned())
    }

    async fn latest_all(&self) -> Result<Vec<StoredReading>, StoreError> {
        let log = self.inner.read().await;
        let mut seen = HashSet::new();
        Ok(log
            .iter()
            .rev()
            .filter(|r| seen.insert(r.device_id.as_str()))
            .cloned()
            .collect())
    }
}
