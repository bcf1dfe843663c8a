use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheEntry, CacheKey, CacheStore};
use crate::clock::{expiry_after, Clock, SystemClock};
use crate::error::CacheError;
use crate::sources::SourceFields;

/// In-process cache. Expired entries stay until overwritten or purged.
#[derive(Debug)]
pub struct MemoryCache {
    inner: RwLock<HashMap<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = g.len();
        g.retain(|_, e| e.is_live(now));
        before - g.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<SourceFields> {
        let now = self.clock.now();
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    async fn set(
        &self,
        key: CacheKey,
        value: SourceFields,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = expiry_after(self.clock.now(), ttl);
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        g.insert(key, CacheEntry { value, expires_at });
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sources::{DroughtFields, DroughtLevel, SourceKind};
    use chrono::{TimeZone, Utc};

    fn drought() -> SourceFields {
        SourceFields::Drought(DroughtFields::new(DroughtLevel::Severe))
    }

    #[tokio::test]
    async fn entry_live_until_expiry_then_missed() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        ));
        let cache = MemoryCache::with_clock(clock.clone());
        let key = CacheKey::new(SourceKind::Drought, "Kern");

        cache
            .set(key.clone(), drought(), Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.get(&key).await, Some(drought()));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(&key).await, None);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn keys_are_per_source_and_entity() {
        let cache = MemoryCache::new();
        cache
            .set(
                CacheKey::new(SourceKind::Drought, "Kern"),
                drought(),
                Duration::from_secs(600),
            )
            .await
            .unwrap();
        assert!(cache
            .get(&CacheKey::new(SourceKind::Drought, "Kings"))
            .await
            .is_none());
        assert!(cache
            .get(&CacheKey::new(SourceKind::Weather, "Kern"))
            .await
            .is_none());
    }
}
