//! Per-identifier threshold cache
//!
//! The first request for an identifier runs the estimator on the supplied
//! waveform and stores the surface; every later request returns the stored
//! surface untouched, whatever waveform it passes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use dt_core::{DompteurConfig, DompteurError, Result, wav};

use crate::estimator::{ExternalEstimator, ThresholdEstimator};
use crate::store::{DirectoryStore, MemoryStore, SurfaceStore};
use crate::surface::ThresholdSurface;

/// Name of the waveform written into each scratch directory
const SCRATCH_WAV: &str = "data.wav";

pub struct ThresholdCache {
    store: Box<dyn SurfaceStore>,
    estimator: Box<dyn ThresholdEstimator>,
    /// Parent of the scratch directories (None = system temp dir)
    temp_root: Option<PathBuf>,
}

impl ThresholdCache {
    pub fn new<S, E>(store: S, estimator: E) -> Self
    where
        S: SurfaceStore + 'static,
        E: ThresholdEstimator + 'static,
    {
        Self {
            store: Box::new(store),
            estimator: Box::new(estimator),
            temp_root: None,
        }
    }

    /// Cache backed by a `MemoryStore`
    pub fn in_memory<E: ThresholdEstimator + 'static>(estimator: E) -> Self {
        Self::new(MemoryStore::new(), estimator)
    }

    /// Directory-backed cache running the external estimator, as configured
    pub fn from_config(config: &DompteurConfig) -> Result<Self> {
        let store = DirectoryStore::open(&config.cache_dir)?;
        let cache = Self::new(store, ExternalEstimator::new(config.estimator.clone()));
        Ok(match &config.temp_dir {
            Some(dir) => cache.with_temp_root(dir),
            None => cache,
        })
    }

    /// Builder pattern: create scratch directories under `dir`
    pub fn with_temp_root<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    /// Stored surface for `id`, without computing anything
    pub fn get(&self, id: &str) -> Result<Option<Arc<ThresholdSurface>>> {
        self.store.load(id)
    }

    /// Stored surface for `id`, computing it from `waveform` on first use
    pub fn get_or_compute(&self, id: &str, waveform: &[f64]) -> Result<Arc<ThresholdSurface>> {
        if let Some(surface) = self.store.load(id)? {
            log::debug!("thresholds for {} found in cache", id);
            return Ok(surface);
        }

        log::info!("computing thresholds for {} ({} samples)", id, waveform.len());
        let surface = self.run_estimator(|wav_path| wav::write_pcm16(wav_path, waveform))?;
        self.store.save(id, &surface)?;
        Ok(Arc::new(surface))
    }

    /// Compute the surface of a waveform file and write it to `csv_path`,
    /// bypassing the store
    pub fn compute_for_file(&self, wav_path: &Path, csv_path: &Path) -> Result<ThresholdSurface> {
        log::info!("computing thresholds for {}", wav_path.display());
        let surface = self.run_estimator(|scratch| {
            fs::copy(wav_path, scratch)?;
            Ok(())
        })?;
        surface.write(csv_path)?;
        Ok(surface)
    }

    /// Run the estimator inside a fresh scratch directory that is removed on
    /// every exit path
    fn run_estimator<F>(&self, prepare: F) -> Result<ThresholdSurface>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dompteur-");
        let scratch: TempDir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let wav_path = scratch.path().join(SCRATCH_WAV);
        prepare(&wav_path)?;
        let surface = self.estimator.estimate(&wav_path, scratch.path());

        if let Err(e) = scratch.close() {
            log::warn!("failed to remove estimator scratch directory: {}", e);
        }
        surface.map_err(|e| match e {
            DompteurError::ThresholdComputation(_) => e,
            other => DompteurError::threshold(other.to_string()),
        })
    }
}

impl std::fmt::Debug for ThresholdCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdCache")
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_estimator(calls: Arc<AtomicUsize>) -> impl ThresholdEstimator {
        move |wav: &Path, _: &Path| -> Result<ThresholdSurface> {
            calls.fetch_add(1, Ordering::SeqCst);
            let samples = wav::read_pcm16(wav)?;
            let frames = 1 + samples.len() / 256 + 8;
            let level = calls.load(Ordering::SeqCst) as f64;
            ThresholdSurface::from_fn(frames, 256, move |_, _| level)
        }
    }

    #[test]
    fn test_estimator_runs_once_per_id() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ThresholdCache::in_memory(counting_estimator(calls.clone()));

        let first = cache.get_or_compute("utt", &vec![100.0; 1000]).unwrap();
        // Different waveform, same identifier: stored surface is reused
        let second = cache.get_or_compute("utt", &vec![-5.0; 3000]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second.num_frames(), 1 + 1000 / 256 + 8);

        cache.get_or_compute("other", &vec![0.0; 500]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.contains("utt"));
        assert!(cache.contains("other"));
    }

    #[test]
    fn test_failure_leaves_nothing_behind() {
        let temp_root = tempfile::tempdir().unwrap();
        let failing = |_: &Path, work: &Path| -> Result<ThresholdSurface> {
            fs::write(work.join("partial.csv"), "1,2,3")?;
            Err(DompteurError::threshold("estimator crashed"))
        };
        let cache = ThresholdCache::in_memory(failing).with_temp_root(temp_root.path());

        let err = cache.get_or_compute("utt", &vec![1.0; 800]).unwrap_err();
        assert!(matches!(err, DompteurError::ThresholdComputation(_)));
        assert!(!cache.contains("utt"));
        assert!(cache.get("utt").unwrap().is_none());
        assert_eq!(fs::read_dir(temp_root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_output_is_threshold_error() {
        let temp_root = tempfile::tempdir().unwrap();
        // Parse failures inside the estimator surface as threshold errors
        let garbage = |_: &Path, work: &Path| -> Result<ThresholdSurface> {
            let path = work.join("data_dB.csv");
            fs::write(&path, "1,2\n3\n")?;
            dt_core::table::Table::read(&path).and_then(ThresholdSurface::from_table)
        };
        let cache = ThresholdCache::in_memory(garbage).with_temp_root(temp_root.path());

        let err = cache.get_or_compute("utt", &vec![1.0; 800]).unwrap_err();
        assert!(matches!(err, DompteurError::ThresholdComputation(_)));
        assert_eq!(fs::read_dir(temp_root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_scratch_directory_exists_during_call() {
        let temp_root = tempfile::tempdir().unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_in = seen.clone();
        let est = move |wav: &Path, work: &Path| {
            assert!(wav.is_file());
            assert!(wav.starts_with(work));
            *seen_in.lock() = Some(work.to_path_buf());
            ThresholdSurface::from_fn(9, 256, |_, _| 1.0)
        };
        let cache = ThresholdCache::in_memory(est).with_temp_root(temp_root.path());
        cache.get_or_compute("utt", &[1.0, 2.0]).unwrap();

        let work = seen.lock().clone().unwrap();
        assert!(work.file_name().unwrap().to_string_lossy().starts_with("dompteur-"));
        assert!(!work.exists());
    }

    #[test]
    fn test_compute_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("a.wav");
        let csv_path = dir.path().join("a.csv");
        wav::write_pcm16(&wav_path, &vec![10.0; 2560]).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ThresholdCache::in_memory(counting_estimator(calls));
        let surface = cache.compute_for_file(&wav_path, &csv_path).unwrap();

        assert_eq!(surface.num_frames(), 1 + 10 + 8);
        assert_eq!(ThresholdSurface::read(&csv_path).unwrap(), surface);
        // The store is not involved
        assert!(!cache.contains("a"));
    }
}
