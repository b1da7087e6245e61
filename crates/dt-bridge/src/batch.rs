//! Directory preprocessing
//!
//! Every `<stem>.wav` directly inside a directory is replaced by its filtered
//! version. The untouched input is kept as `<stem>.original.wav` and, with φ
//! present, its threshold surface is written to `<stem>.csv`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use dt_core::{DompteurConfig, DompteurError, FilterMode, Result, wav};
use dt_psycho::{MaskedFilter, ThresholdSurface};

/// Suffix given to the preserved input of every processed file
pub const ORIGINAL_SUFFIX: &str = ".original.wav";

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed,
}

/// Outcome of one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// File as found in the directory
    pub path: PathBuf,
    pub status: ItemStatus,
    /// Where the untouched input was moved (if it was)
    pub original: Option<PathBuf>,
    /// Fraction of spectral bins kept by the mask
    pub kept_ratio: Option<f64>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ItemResult {
    pub fn success(path: PathBuf, original: PathBuf, kept_ratio: Option<f64>, duration: Duration) -> Self {
        Self {
            path,
            status: ItemStatus::Completed,
            original: Some(original),
            kept_ratio,
            duration,
            error: None,
        }
    }

    pub fn failure(path: PathBuf, error: String, duration: Duration) -> Self {
        Self {
            path,
            status: ItemStatus::Failed,
            original: None,
            kept_ratio: None,
            duration,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Completed
    }
}

/// Outcome of a whole directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub directory: PathBuf,
    pub mode: FilterMode,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ItemResult>,
}

impl BatchReport {
    fn new(directory: PathBuf, mode: FilterMode, results: Vec<ItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            directory,
            mode,
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREPROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct BatchPreprocessor {
    filter: MaskedFilter,
    mode: FilterMode,
    jobs: usize,
}

impl BatchPreprocessor {
    pub fn new(filter: MaskedFilter, mode: FilterMode) -> Self {
        Self {
            filter,
            mode,
            jobs: 1,
        }
    }

    pub fn from_config(config: &DompteurConfig) -> Result<Self> {
        Ok(Self::new(MaskedFilter::from_config(config)?, config.phi).with_jobs(config.effective_jobs()))
    }

    /// Set worker count
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Waveforms in `dir` that still need processing, sorted by name
    pub fn pending_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".wav") && !name.ends_with(ORIGINAL_SUFFIX) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Process every pending waveform in `dir` on `jobs` workers. Item
    /// failures are reported, not propagated.
    pub fn batch_preprocess(&self, dir: &Path) -> Result<BatchReport> {
        let files = Self::pending_files(dir)?;
        log::info!(
            "preprocessing {} files in {} (φ {}, {} jobs)",
            files.len(),
            dir.display(),
            self.mode,
            self.jobs
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("dt-batch-{}", i))
            .build()
            .map_err(|e| DompteurError::Config(format!("batch thread pool: {}", e)))?;

        let results: Vec<ItemResult> = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let start = Instant::now();
                    match self.process_file(path) {
                        Ok((original, kept_ratio)) => {
                            log::info!("converted {}", path.display());
                            ItemResult::success(path.clone(), original, kept_ratio, start.elapsed())
                        }
                        Err(e) => {
                            log::error!("failed to convert {}: {}", path.display(), e);
                            ItemResult::failure(path.clone(), e.to_string(), start.elapsed())
                        }
                    }
                })
                .collect()
        });

        let report = BatchReport::new(dir.to_path_buf(), self.mode, results);
        log::info!("{} converted, {} failed", report.succeeded, report.failed);
        Ok(report)
    }

    /// Thresholds, rename, convert. Returns the preserved input's path.
    fn process_file(&self, path: &Path) -> Result<(PathBuf, Option<f64>)> {
        let original = original_path(path)?;
        if original.exists() {
            return Err(DompteurError::Config(format!(
                "{} already exists; refusing to overwrite a preserved input",
                original.display()
            )));
        }

        let csv = path.with_extension("csv");
        if !self.mode.is_identity() {
            self.filter.cache().compute_for_file(path, &csv)?;
        }

        fs::rename(path, &original)?;
        match self.convert(&original, &csv, path) {
            Ok(kept_ratio) => Ok((original, kept_ratio)),
            Err(e) => {
                // Put the input back so the directory looks untouched
                if let Err(restore) = fs::rename(&original, path) {
                    log::error!("cannot restore {}: {}", path.display(), restore);
                }
                Err(e)
            }
        }
    }

    fn convert(&self, input: &Path, csv: &Path, output: &Path) -> Result<Option<f64>> {
        let samples = wav::read_pcm16(input)?;
        let (filtered, kept_ratio) = match self.mode {
            FilterMode::Identity => (samples, None),
            FilterMode::Masked(phi) => {
                let surface = ThresholdSurface::read(csv)?;
                let out = self.filter.forward_with_surface(&samples, &surface, phi)?;
                (out.signal, Some(out.kept_ratio))
            }
        };
        wav::write_pcm16(output, &filtered)?;
        Ok(kept_ratio)
    }
}

/// `<dir>/<stem>.wav` → `<dir>/<stem>.original.wav`
fn original_path(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DompteurError::Config(format!("{} has no usable file name", path.display())))?;
    Ok(path.with_file_name(format!("{}{}", stem, ORIGINAL_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_path() {
        let original = original_path(Path::new("/data/utt_01.wav")).unwrap();
        assert_eq!(original, PathBuf::from("/data/utt_01.original.wav"));
    }

    #[test]
    fn test_pending_files_skips_originals() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.wav", "a.original.wav", "notes.txt", "a.csv"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.wav")).unwrap();

        let files = BatchPreprocessor::pending_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.wav", "b.wav"]);
    }

    #[test]
    fn test_report_counts() {
        let results = vec![
            ItemResult::success("a.wav".into(), "a.original.wav".into(), None, Duration::ZERO),
            ItemResult::failure("b.wav".into(), "boom".into(), Duration::ZERO),
        ];
        let report = BatchReport::new(PathBuf::from("."), FilterMode::Identity, results);
        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"mode\":\"None\""));
        assert!(json.contains("\"status\":\"failed\""));
    }
}
