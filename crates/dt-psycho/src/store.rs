//! Threshold surface storage
//!
//! Entries are keyed by identifier and never change once written. Two
//! backends are provided: an in-process map and a directory of CSV files
//! that survives across processes (one `threshs_id.<id>.csv` per entry).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use dt_core::{DompteurError, Result};

use crate::surface::ThresholdSurface;

/// Keyed, write-once surface storage shared by concurrent workers
pub trait SurfaceStore: Send + Sync {
    /// Surface stored for `id`, if any
    fn load(&self, id: &str) -> Result<Option<Arc<ThresholdSurface>>>;

    /// Store `surface` under `id`, replacing nothing visible to readers until
    /// the write is complete
    fn save(&self, id: &str, surface: &ThresholdSurface) -> Result<()>;

    fn contains(&self, id: &str) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Arc<ThresholdSurface>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SurfaceStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Option<Arc<ThresholdSurface>>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn save(&self, id: &str, surface: &ThresholdSurface) -> Result<()> {
        self.entries
            .write()
            .insert(id.to_string(), Arc::new(surface.clone()));
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// File-backed store shared between processes
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entry for `id`
    pub fn entry_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("threshs_id.{}.csv", id)))
    }
}

impl SurfaceStore for DirectoryStore {
    fn load(&self, id: &str) -> Result<Option<Arc<ThresholdSurface>>> {
        let path = self.entry_path(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        ThresholdSurface::read(&path).map(|s| Some(Arc::new(s)))
    }

    fn save(&self, id: &str, surface: &ThresholdSurface) -> Result<()> {
        let path = self.entry_path(id)?;
        surface.write(&path)?;
        log::debug!("stored thresholds for {} at {}", id, path.display());
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.entry_path(id).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Identifiers become file names, so they must not escape the store root
fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DompteurError::Config(format!("invalid identifier `{}`", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(level: f64) -> ThresholdSurface {
        ThresholdSurface::from_fn(10, 256, |frame, band| level + (frame * band) as f64).unwrap()
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.load("a").unwrap().is_none());

        store.save("a", &surface(1.0)).unwrap();
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert_eq!(*store.load("a").unwrap().unwrap(), surface(1.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_directory_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("threshs_tmp")).unwrap();

        store.save("utt_01", &surface(20.0)).unwrap();
        assert!(store.root().join("threshs_id.utt_01.csv").is_file());

        // A second handle on the same directory sees the entry
        let other = DirectoryStore::open(store.root()).unwrap();
        assert!(other.contains("utt_01"));
        assert_eq!(*other.load("utt_01").unwrap().unwrap(), surface(20.0));
        assert!(other.load("utt_02").unwrap().is_none());
    }

    #[test]
    fn test_directory_store_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        assert!(store.save("../escape", &surface(0.0)).is_err());
        assert!(store.save("", &surface(0.0)).is_err());
        assert!(!store.contains("a/b"));
    }

    #[test]
    fn test_directory_store_corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("threshs_id.bad.csv"), "1,2\n3\n").unwrap();

        assert!(matches!(
            store.load("bad"),
            Err(DompteurError::ThresholdComputation(_))
        ));
    }
}
