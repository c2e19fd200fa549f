//! Durable per-job weight state.
//!
//! Layout under the weights directory:
//!
//! ```text
//! base_weight.safetensors        shared initialisation
//! weight_job_<job_id>.safetensors one file per job
//! ```
//!
//! A job without its own file is seeded from the base weights, and the seed is
//! written out immediately so every later request for that job starts from the
//! same parameters. One store-wide lock serializes every load and save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::WeightCache;
use crate::error::{ModelError, Result};
use crate::regressor::PotencyRegressor;

pub const BASE_WEIGHT_FILE: &str = "base_weight.safetensors";

const JOB_PREFIX: &str = "weight_job_";
const EXTENSION: &str = ".safetensors";

/// Where `load_or_init` found a job's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightOrigin {
    Cache,
    Job,
    Base,
}

pub struct WeightStore {
    dir: PathBuf,
    input_dim: usize,
    cache: WeightCache,
    lock: Mutex<()>,
}

impl std::fmt::Debug for WeightStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightStore")
            .field("dir", &self.dir)
            .field("input_dim", &self.input_dim)
            .field("cache", &self.cache)
            .finish()
    }
}

impl WeightStore {
    /// Open (creating if needed) a weights directory.
    pub fn open(dir: impl AsRef<Path>, input_dim: usize, cache: WeightCache) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir, input_dim, cache, lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn cache(&self) -> &WeightCache {
        &self.cache
    }

    pub fn base_path(&self) -> PathBuf {
        self.dir.join(BASE_WEIGHT_FILE)
    }

    pub fn job_path(&self, job_id: i64) -> PathBuf {
        self.dir.join(format!("{JOB_PREFIX}{job_id}{EXTENSION}"))
    }

    /// Write freshly initialised base weights if none exist yet.
    /// Returns `true` when a new file was created.
    pub fn ensure_base(&self) -> Result<bool> {
        let _guard = self.guard();
        let path = self.base_path();
        if path.exists() {
            debug!(path = %path.display(), "Base weights present");
            return Ok(false);
        }
        let model = PotencyRegressor::new(self.input_dim)?;
        self.write_atomic(&model, &path)?;
        info!(path = %path.display(), input_dim = self.input_dim, "Base weights created");
        Ok(true)
    }

    /// Load a job's weights, seeding and persisting them from the base
    /// weights on first use.
    pub fn load_or_init(&self, job_id: i64) -> Result<(PotencyRegressor, WeightOrigin)> {
        let _guard = self.guard();
        self.load_or_init_locked(job_id)
    }

    /// Persist a job's weights and refresh the cache.
    pub fn persist(&self, job_id: i64, model: &PotencyRegressor) -> Result<()> {
        let _guard = self.guard();
        self.persist_locked(job_id, model)
    }

    /// Load-or-init, apply `f`, persist. The lock is held throughout so
    /// concurrent updates to one job cannot lose each other's steps.
    pub fn update<T, F>(&self, job_id: i64, f: F) -> Result<T>
    where
        F: FnOnce(&mut PotencyRegressor) -> Result<T>,
    {
        let _guard = self.guard();
        let (mut model, _) = self.load_or_init_locked(job_id)?;
        let out = f(&mut model)?;
        self.persist_locked(job_id, &model)?;
        Ok(out)
    }

    /// Job ids with a weight file on disk, ascending.
    pub fn stored_jobs(&self) -> Result<Vec<i64>> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix(JOB_PREFIX)
                .and_then(|rest| rest.strip_suffix(EXTENSION))
                .and_then(|id| id.parse::<i64>().ok())
            {
                jobs.push(id);
            }
        }
        jobs.sort_unstable();
        Ok(jobs)
    }

    /// Delete a job's weights. The next request for the job reseeds from base.
    pub fn remove(&self, job_id: i64) -> Result<bool> {
        let _guard = self.guard();
        self.cache.remove(job_id);
        let path = self.job_path(job_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(job_id, "Removed job weights");
        Ok(true)
    }

    fn load_or_init_locked(&self, job_id: i64) -> Result<(PotencyRegressor, WeightOrigin)> {
        if let Some(snapshot) = self.cache.get(job_id) {
            if snapshot.weight.len() == self.input_dim {
                debug!(job_id, "Weight cache hit");
                return Ok((PotencyRegressor::from_snapshot(&snapshot)?, WeightOrigin::Cache));
            }
            warn!(job_id, "Cached weights have the wrong width, dropping");
            self.cache.remove(job_id);
        }

        let path = self.job_path(job_id);
        if path.exists() {
            let model = PotencyRegressor::load(&path, self.input_dim)?;
            self.cache.put(job_id, model.snapshot()?, &path, true);
            debug!(job_id, path = %path.display(), "Loaded job weights");
            return Ok((model, WeightOrigin::Job));
        }

        let base = self.base_path();
        if !base.exists() {
            return Err(ModelError::MissingBaseWeights(base));
        }
        let model = PotencyRegressor::load(&base, self.input_dim)?;
        self.write_atomic(&model, &path)?;
        self.cache.put(job_id, model.snapshot()?, &path, true);
        info!(job_id, path = %path.display(), "Seeded job weights from base");
        Ok((model, WeightOrigin::Base))
    }

    fn persist_locked(&self, job_id: i64, model: &PotencyRegressor) -> Result<()> {
        let path = self.job_path(job_id);
        self.cache.put(job_id, model.snapshot()?, &path, false);
        match self.write_atomic(model, &path) {
            Ok(()) => {
                self.cache.set_synced(job_id, true);
                debug!(job_id, path = %path.display(), "Persisted job weights");
                Ok(())
            }
            Err(e) => {
                // Disk stays the source of truth
                self.cache.remove(job_id);
                Err(e)
            }
        }
    }

    fn write_atomic(&self, model: &PotencyRegressor, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self.dir.join(format!(".{file_name}.tmp"));
        model.save(&tmp)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regressor::DEFAULT_INPUT_DIM;
    use std::sync::Arc;

    fn store(dir: &Path, cache: usize) -> WeightStore {
        WeightStore::open(dir, 3, WeightCache::new(cache)).unwrap()
    }

    fn write_base(store: &WeightStore, weight: &[f32], bias: f32) {
        PotencyRegressor::from_parameters(weight, bias)
            .unwrap()
            .save(store.base_path())
            .unwrap();
    }

    #[test]
    fn test_missing_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 0);
        assert!(matches!(store.load_or_init(1), Err(ModelError::MissingBaseWeights(_))));
        assert!(store.stored_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_first_use_seeds_and_persists_from_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 0);
        write_base(&store, &[1.0, 0.0, 0.0], 0.5);

        let (model, origin) = store.load_or_init(42).unwrap();
        assert_eq!(origin, WeightOrigin::Base);
        assert!(store.job_path(42).exists());
        assert_eq!(model.snapshot().unwrap().bias, 0.5);

        let (_, origin) = store.load_or_init(42).unwrap();
        assert_eq!(origin, WeightOrigin::Job);
        assert_eq!(store.stored_jobs().unwrap(), vec![42]);
    }

    #[test]
    fn test_job_weights_diverge_from_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 0);
        write_base(&store, &[0.0; 3], 0.0);

        store.update(1, |m| m.train_step(&[1.0, 1.0, 1.0], 1.0, 0.01)).unwrap();

        let (trained, _) = store.load_or_init(1).unwrap();
        let (fresh, origin) = store.load_or_init(2).unwrap();
        assert_eq!(origin, WeightOrigin::Base);
        assert!(trained.snapshot().unwrap().bias > 0.0);
        assert_eq!(fresh.snapshot().unwrap().bias, 0.0);

        let base = PotencyRegressor::load(store.base_path(), 3).unwrap();
        assert_eq!(base.snapshot().unwrap().bias, 0.0, "base must never be modified");
    }

    #[test]
    fn test_cache_serves_repeat_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);
        write_base(&store, &[0.0; 3], 0.0);

        store.load_or_init(5).unwrap();
        let (_, origin) = store.load_or_init(5).unwrap();
        assert_eq!(origin, WeightOrigin::Cache);

        store.update(5, |m| m.train_step(&[1.0; 3], 2.0, 0.1)).unwrap();
        let cached = store.cache().entries();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].synced);

        // The cached snapshot matches what is on disk
        let on_disk = PotencyRegressor::load(store.job_path(5), 3).unwrap().snapshot().unwrap();
        assert_eq!(store.cache().get(5), Some(on_disk));
    }

    #[test]
    fn test_failed_update_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 0);
        write_base(&store, &[0.0; 3], 0.0);

        let err = store.update(3, |m| m.train_step(&[1.0; 7], 1.0, 0.01));
        assert!(matches!(err, Err(ModelError::InvalidFeatureDimension { expected: 3, actual: 7 })));

        // The seed was written, but it still equals the base
        let (model, origin) = store.load_or_init(3).unwrap();
        assert_eq!(origin, WeightOrigin::Job);
        assert_eq!(model.snapshot().unwrap().bias, 0.0);
    }

    #[test]
    fn test_ensure_base_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = WeightStore::open(dir.path().join("nested/weights"), DEFAULT_INPUT_DIM, WeightCache::disabled()).unwrap();
        assert!(store.ensure_base().unwrap());
        let first = PotencyRegressor::load(store.base_path(), DEFAULT_INPUT_DIM).unwrap().snapshot().unwrap();
        assert!(!store.ensure_base().unwrap());
        let second = PotencyRegressor::load(store.base_path(), DEFAULT_INPUT_DIM).unwrap().snapshot().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_remove_reseeds_from_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        write_base(&store, &[0.0; 3], 0.0);

        store.update(8, |m| m.train_step(&[1.0; 3], 5.0, 0.1)).unwrap();
        assert!(store.remove(8).unwrap());
        assert!(!store.remove(8).unwrap());

        let (model, origin) = store.load_or_init(8).unwrap();
        assert_eq!(origin, WeightOrigin::Base);
        assert_eq!(model.snapshot().unwrap().bias, 0.0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path(), 0));
        write_base(&store, &[0.0; 3], 0.0);

        // Zero features leave only the bias trainable
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.update(11, |m| m.train_step(&[0.0; 3], 1.0, 0.01)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // b_{n+1} = b_n + 0.02 * (1 - b_n)  =>  b_8 = 1 - 0.98^8
        let expected = 1.0 - 0.98f32.powi(8);
        let (model, _) = store.load_or_init(11).unwrap();
        let bias = model.snapshot().unwrap().bias;
        assert!((bias - expected).abs() < 1e-5, "bias {bias}, expected {expected}");
    }
}
