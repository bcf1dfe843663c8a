// src/cache/mod.rs
//! Per-(source, entity) cache with lazy expiry.
//!
//! One store is shared by every in-flight fetch. Reads never fail: an expired,
//! corrupted or unreadable entry is a miss.

pub mod file;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::sources::{SourceFields, SourceKind};

pub use file::FileCache;
pub use memory::MemoryCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: SourceKind,
    pub entity: String,
}

impl CacheKey {
    pub fn new(source: SourceKind, entity: &str) -> Self {
        Self {
            source,
            entity: entity.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: SourceFields,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Valid up to and including `expires_at`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<SourceFields>;
    async fn set(&self, key: CacheKey, value: SourceFields, ttl: Duration)
        -> Result<(), CacheError>;
    fn backend(&self) -> &'static str;
}

/// How long each source's answer may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub weather: Duration,
    pub drought: Duration,
    pub active_fire: Duration,
    pub incident_feed: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(60 * 60),
            drought: Duration::from_secs(24 * 60 * 60),
            active_fire: Duration::from_secs(2 * 60 * 60),
            incident_feed: Duration::from_secs(30 * 60),
        }
    }
}

impl TtlPolicy {
    pub fn ttl_for(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::Weather => self.weather,
            SourceKind::Drought => self.drought,
            SourceKind::ActiveFire => self.active_fire,
            SourceKind::IncidentFeed => self.incident_feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_source_contract() {
        let p = TtlPolicy::default();
        assert_eq!(p.ttl_for(SourceKind::Weather).as_secs(), 3_600);
        assert_eq!(p.ttl_for(SourceKind::Drought).as_secs(), 86_400);
        assert_eq!(p.ttl_for(SourceKind::ActiveFire).as_secs(), 7_200);
        assert_eq!(p.ttl_for(SourceKind::IncidentFeed).as_secs(), 1_800);
    }
}
