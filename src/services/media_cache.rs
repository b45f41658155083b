//! On-disk LRU cache for fetched audio streams.
//!
//! One opaque file per external video id plus a sidecar metadata file.
//! Metadata mutations are serialized behind a mutex; workers only touch the
//! directory through this type.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const METADATA_FILE: &str = "cache_metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub download_date: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub total_size_gb: f64,
    pub max_size_bytes: u64,
    pub max_size_gb: f64,
    pub usage_percent: f64,
    pub file_count: usize,
    pub available_bytes: u64,
    pub available_gb: f64,
}

struct CacheInner {
    metadata: HashMap<String, CacheEntry>,
    max_size_bytes: u64,
}

pub struct MediaCache {
    cache_dir: PathBuf,
    inner: Mutex<CacheInner>,
}

impl MediaCache {
    /// Open (or create) the cache directory, load the sidecar metadata and
    /// reconcile it with what is actually on disk: orphan files are deleted,
    /// entries without a file are dropped.
    pub fn new(cache_dir: impl Into<PathBuf>, max_size_gb: f64) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir {}", cache_dir.display()))?;

        let max_size_bytes = (max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64;
        let mut metadata = Self::load_metadata(&cache_dir);

        // Drop entries whose file vanished.
        metadata.retain(|video_id, entry| {
            let present = cache_dir.join(&entry.filename).is_file();
            if !present {
                tracing::warn!(video_id, "Cached file missing, dropping metadata entry");
            }
            present
        });

        // Delete files nothing tracks.
        if let Ok(dir) = std::fs::read_dir(&cache_dir) {
            let tracked: std::collections::HashSet<String> =
                metadata.values().map(|e| e.filename.clone()).collect();
            for entry in dir.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name == METADATA_FILE || !entry.path().is_file() {
                    continue;
                }
                if !tracked.contains(&name) {
                    tracing::info!(file = %name, "Deleting orphaned cache file");
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }

        let cache = Self {
            cache_dir,
            inner: Mutex::new(CacheInner {
                metadata,
                max_size_bytes,
            }),
        };
        cache.save_locked(&cache.inner.lock().unwrap());
        tracing::info!(
            max_size_gb,
            "Media cache initialized ({} tracked files)",
            cache.inner.lock().unwrap().metadata.len()
        );
        Ok(cache)
    }

    fn load_metadata(cache_dir: &Path) -> HashMap<String, CacheEntry> {
        let path = cache_dir.join(METADATA_FILE);
        if !path.exists() {
            return HashMap::new();
        }
        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
        {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load cache metadata, starting empty");
                HashMap::new()
            }
        }
    }

    fn save_locked(&self, inner: &CacheInner) {
        let path = self.cache_dir.join(METADATA_FILE);
        match serde_json::to_string_pretty(&inner.metadata) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&path, raw) {
                    tracing::error!(error = %err, "Failed to save cache metadata");
                }
            }
            Err(err) => tracing::error!(error = %err, "Failed to serialize cache metadata"),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path for a cached id, updating its `last_accessed`.
    pub fn lookup(&self, video_id: &str) -> Option<PathBuf> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.metadata.get_mut(video_id)?;
        let path = self.cache_dir.join(&entry.filename);
        if !path.is_file() {
            tracing::warn!(video_id, "Cached file missing, dropping metadata entry");
            inner.metadata.remove(video_id);
            self.save_locked(&inner);
            return None;
        }
        entry.last_accessed = Utc::now();
        self.save_locked(&inner);
        Some(path)
    }

    /// Like `lookup` but without touching the access time. Used by info
    /// endpoints that must not perturb eviction order.
    pub fn peek(&self, video_id: &str) -> Option<(PathBuf, u64)> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.metadata.get(video_id)?;
        let path = self.cache_dir.join(&entry.filename);
        path.is_file().then(|| (path, entry.size_bytes))
    }

    /// Record a freshly-downloaded file.
    pub fn admit(&self, video_id: &str, filename: &str, size_bytes: u64) {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        inner.metadata.insert(
            video_id.to_string(),
            CacheEntry {
                filename: filename.to_string(),
                size_bytes,
                download_date: now,
                last_accessed: now,
            },
        );
        self.save_locked(&inner);
        tracing::info!(
            video_id,
            filename,
            size_mb = size_bytes as f64 / 1024.0 / 1024.0,
            "Admitted file to cache"
        );
    }

    fn total_size_locked(&self, inner: &mut CacheInner) -> u64 {
        let mut total = 0u64;
        let mut missing = Vec::new();
        for (video_id, entry) in inner.metadata.iter() {
            match std::fs::metadata(self.cache_dir.join(&entry.filename)) {
                Ok(meta) => total += meta.len(),
                Err(_) => missing.push(video_id.clone()),
            }
        }
        for video_id in missing {
            tracing::warn!(%video_id, "Cached file missing, dropping metadata entry");
            inner.metadata.remove(&video_id);
        }
        total
    }

    /// Evict least-recently-used files until `current + estimate` fits the
    /// quota.
    pub fn make_room(&self, estimated_new_bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut current = self.total_size_locked(&mut inner);
        let quota = inner.max_size_bytes;

        if current + estimated_new_bytes <= quota {
            return;
        }
        tracing::info!(
            current_mb = current as f64 / 1024.0 / 1024.0,
            quota_mb = quota as f64 / 1024.0 / 1024.0,
            "Cache cleanup needed"
        );

        let target = quota.saturating_sub(estimated_new_bytes);
        let mut by_age: Vec<(String, DateTime<Utc>, String)> = inner
            .metadata
            .iter()
            .map(|(id, e)| (id.clone(), e.last_accessed, e.filename.clone()))
            .collect();
        by_age.sort_by_key(|(_, accessed, _)| *accessed);

        let mut freed = 0u64;
        let mut deleted = 0usize;
        for (video_id, _, filename) in by_age {
            if current <= target {
                break;
            }
            let path = self.cache_dir.join(&filename);
            if let Ok(meta) = std::fs::metadata(&path) {
                let size = meta.len();
                if std::fs::remove_file(&path).is_ok() {
                    current = current.saturating_sub(size);
                    freed += size;
                    deleted += 1;
                    tracing::info!(file = %filename, size_mb = size as f64 / 1024.0 / 1024.0, "Evicted LRU file");
                }
            }
            inner.metadata.remove(&video_id);
        }

        self.save_locked(&inner);
        tracing::info!(
            deleted,
            freed_mb = freed as f64 / 1024.0 / 1024.0,
            "Cache cleanup complete"
        );
    }

    /// Delete every cached file and reset metadata.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut deleted = 0usize;
        for entry in inner.metadata.values() {
            if std::fs::remove_file(self.cache_dir.join(&entry.filename)).is_ok() {
                deleted += 1;
            }
        }
        inner.metadata.clear();
        self.save_locked(&inner);
        tracing::info!(deleted, "Cache cleared");
        deleted
    }

    pub fn stats(&self) -> CacheStats {
        let mut inner = self.inner.lock().unwrap();
        let total = self.total_size_locked(&mut inner);
        let max = inner.max_size_bytes;
        let file_count = inner.metadata.len();
        self.save_locked(&inner);
        CacheStats {
            total_size_bytes: total,
            total_size_mb: total as f64 / 1024.0 / 1024.0,
            total_size_gb: total as f64 / 1024.0 / 1024.0 / 1024.0,
            max_size_bytes: max,
            max_size_gb: max as f64 / 1024.0 / 1024.0 / 1024.0,
            usage_percent: if max > 0 {
                total as f64 / max as f64 * 100.0
            } else {
                0.0
            },
            file_count,
            available_bytes: max.saturating_sub(total),
            available_gb: max.saturating_sub(total) as f64 / 1024.0 / 1024.0 / 1024.0,
        }
    }

    /// Change the quota; shrinking below current usage evicts immediately.
    pub fn set_quota(&self, new_max_size_gb: f64) {
        let shrunk = {
            let mut inner = self.inner.lock().unwrap();
            let old = inner.max_size_bytes;
            inner.max_size_bytes = (new_max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64;
            tracing::info!(
                old_gb = old as f64 / 1024.0 / 1024.0 / 1024.0,
                new_gb = new_max_size_gb,
                "Cache quota updated"
            );
            inner.max_size_bytes < old
        };
        if shrunk {
            self.make_room(0);
        }
    }

    pub fn quota_bytes(&self) -> u64 {
        self.inner.lock().unwrap().max_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn cache_with_quota_mib(dir: &Path, quota_mib: u64) -> MediaCache {
        MediaCache::new(dir, quota_mib as f64 / 1024.0).unwrap()
    }

    fn write_file(cache: &MediaCache, id: &str, size_mib: u64) {
        let filename = format!("{}.webm", id);
        std::fs::write(
            cache.cache_dir().join(&filename),
            vec![0u8; (size_mib * MIB) as usize],
        )
        .unwrap();
        cache.admit(id, &filename, size_mib * MIB);
    }

    #[test]
    fn lookup_touches_access_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_quota_mib(dir.path(), 100);
        write_file(&cache, "a", 1);

        let before = cache.peek("a").unwrap();
        assert_eq!(before.1, MIB);
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("missing").is_none());
    }

    #[test]
    fn lru_eviction_respects_recent_access() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_quota_mib(dir.path(), 30);

        write_file(&cache, "a", 10);
        write_file(&cache, "b", 10);
        write_file(&cache, "c", 10);

        // Touch A so B becomes the oldest.
        assert!(cache.lookup("a").is_some());

        cache.make_room(10 * MIB);
        write_file(&cache, "d", 10);

        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none(), "oldest entry should be evicted");
        assert!(cache.peek("c").is_some());
        assert!(cache.peek("d").is_some());
        assert!(cache.stats().total_size_bytes <= 30 * MIB);
    }

    #[test]
    fn quota_shrink_evicts_down_to_new_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_quota_mib(dir.path(), 30);
        write_file(&cache, "a", 10);
        write_file(&cache, "b", 10);
        write_file(&cache, "c", 10);

        cache.set_quota(15.0 / 1024.0);

        let stats = cache.stats();
        assert!(stats.total_size_bytes <= 15 * MIB);
        // The most recently admitted file survives.
        assert!(cache.peek("c").is_some());
    }

    #[test]
    fn startup_reconciles_orphans_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_with_quota_mib(dir.path(), 100);
            write_file(&cache, "kept", 1);
            write_file(&cache, "vanished", 1);
        }
        // An orphan the metadata does not know about.
        std::fs::write(dir.path().join("orphan.m4a"), b"junk").unwrap();
        // A tracked file that disappeared.
        std::fs::remove_file(dir.path().join("vanished.webm")).unwrap();

        let cache = cache_with_quota_mib(dir.path(), 100);
        assert!(cache.peek("kept").is_some());
        assert!(cache.peek("vanished").is_none());
        assert!(!dir.path().join("orphan.m4a").exists());
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_quota_mib(dir.path(), 100);
        write_file(&cache, "a", 1);
        write_file(&cache, "b", 1);

        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.stats().file_count, 0);
        assert_eq!(cache.stats().total_size_bytes, 0);
    }
}
