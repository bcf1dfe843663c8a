//! JSON-file cache backend: one file per (source, entity) under a directory.
//!
//! Each file holds its full key, the value and its absolute `expires_at`, so expiry
//! does not depend on file mtimes. File names are lossy slugs; a file whose stored
//! key differs from the requested one is a miss. Writes go through a temp file and
//! a rename.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{CacheEntry, CacheKey, CacheStore};
use crate::clock::{expiry_after, Clock, SystemClock};
use crate::error::CacheError;
use crate::sources::SourceFields;

/// On-disk layout of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: CacheKey,
    value: SourceFields,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    tmp_seq: AtomicU64,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `weather_los_angeles.json`, `drought_san_luis_obispo.json`, ...
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", key.source.as_str(), slug(&key.entity)))
    }

    async fn read_entry(&self, path: &Path) -> Result<FileEntry, CacheError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &CacheKey) -> Option<SourceFields> {
        let path = self.path_for(key);
        let entry = match self.read_entry(&path).await {
            Ok(e) => e,
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    target: "cache",
                    path = %path.display(),
                    error = %e,
                    "unreadable cache entry treated as miss"
                );
                return None;
            }
        };
        if entry.key != *key || entry.value.kind() != key.source {
            tracing::debug!(
                target: "cache",
                path = %path.display(),
                stored = %entry.key.entity,
                requested = %key.entity,
                "cache file belongs to another key; treated as miss"
            );
            return None;
        }
        let live = CacheEntry {
            value: entry.value,
            expires_at: entry.expires_at,
        };
        live.is_live(self.clock.now()).then_some(live.value)
    }

    async fn set(
        &self,
        key: CacheKey,
        value: SourceFields,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&key);
        let entry = FileEntry {
            key,
            value,
            expires_at: expiry_after(self.clock.now(), ttl),
        };
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            path.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("entry"),
            std::process::id(),
            seq
        ));
        fs::write(&tmp, serde_json::to_vec(&entry)?).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{SourceKind, WeatherFields};

    #[test]
    fn slug_flattens_names() {
        assert_eq!(slug("San Luis Obispo"), "san_luis_obispo");
        assert_eq!(slug("  Del  Norte "), "del_norte");
    }

    #[tokio::test]
    async fn roundtrip_and_corruption_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = CacheKey::new(SourceKind::Weather, "Los Angeles");
        let value = SourceFields::Weather(WeatherFields {
            temperature_f: Some(81.0),
            ..Default::default()
        });

        cache
            .set(key.clone(), value.clone(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(cache.path_for(&key).ends_with("weather_los_angeles.json"));
        assert_eq!(cache.get(&key).await, Some(value));

        std::fs::write(cache.path_for(&key), b"{ not json").unwrap();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn colliding_slugs_do_not_share_values() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let dashed = CacheKey::new(SourceKind::Weather, "San-Luis");
        let spaced = CacheKey::new(SourceKind::Weather, "San Luis");
        assert_eq!(cache.path_for(&dashed), cache.path_for(&spaced));

        let hot = SourceFields::Weather(WeatherFields {
            temperature_f: Some(104.0),
            ..Default::default()
        });
        cache
            .set(dashed.clone(), hot.clone(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(cache.get(&spaced).await, None);
        assert_eq!(cache.get(&dashed).await, Some(hot));
    }

    #[tokio::test]
    async fn missing_dir_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nope"));
        let key = CacheKey::new(SourceKind::Drought, "Kern");
        assert_eq!(cache.get(&key).await, None);
    }
}
