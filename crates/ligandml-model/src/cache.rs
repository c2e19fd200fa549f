//! In-memory LRU cache of loaded job weights.
//!
//! Entries hold a parameter snapshot plus the path of the file it mirrors, so
//! repeated requests for a hot job skip the safetensors round-trip. A capacity
//! of zero disables the cache entirely.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use crate::regressor::WeightSnapshot;

/// Status view of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedWeight {
    pub job_id: i64,
    pub path: PathBuf,
    pub synced: bool,
}

/// Snapshot view of one cache entry, as served by `/models`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedModel {
    pub job_id: i64,
    #[serde(flatten)]
    pub snapshot: WeightSnapshot,
}

struct Entry {
    snapshot: WeightSnapshot,
    path: PathBuf,
    synced: bool,
}

pub struct WeightCache {
    entries: Option<Mutex<LruCache<i64, Entry>>>,
}

impl std::fmt::Debug for WeightCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl WeightCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|c| c.cap().get()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a job, marking it most recently used.
    pub fn get(&self, job_id: i64) -> Option<WeightSnapshot> {
        let mut cache = self.lock()?;
        cache.get(&job_id).map(|e| e.snapshot.clone())
    }

    /// Insert or replace a job's snapshot, evicting the least recently used
    /// entry when full.
    pub fn put(&self, job_id: i64, snapshot: WeightSnapshot, path: &Path, synced: bool) {
        let Some(mut cache) = self.lock() else { return };
        let entry = Entry { snapshot, path: path.to_path_buf(), synced };
        if let Some((evicted, _)) = cache.push(job_id, entry) {
            if evicted != job_id {
                debug!(job_id = evicted, "Evicted weights from cache");
            }
        }
    }

    pub fn set_synced(&self, job_id: i64, synced: bool) {
        if let Some(mut cache) = self.lock() {
            if let Some(entry) = cache.peek_mut(&job_id) {
                entry.synced = synced;
            }
        }
    }

    pub fn remove(&self, job_id: i64) -> bool {
        self.lock().map(|mut c| c.pop(&job_id).is_some()).unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }

    /// Entries ordered from least to most recently used.
    pub fn entries(&self) -> Vec<CachedWeight> {
        let Some(cache) = self.lock() else { return Vec::new() };
        cache
            .iter()
            .rev()
            .map(|(job_id, e)| CachedWeight { job_id: *job_id, path: e.path.clone(), synced: e.synced })
            .collect()
    }

    /// Snapshots ordered from least to most recently used.
    pub fn models(&self) -> Vec<CachedModel> {
        let Some(cache) = self.lock() else { return Vec::new() };
        cache
            .iter()
            .rev()
            .map(|(job_id, e)| CachedModel { job_id: *job_id, snapshot: e.snapshot.clone() })
            .collect()
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<i64, Entry>>> {
        self.entries
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}
