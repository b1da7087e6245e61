//! Atomic file replacement
//!
//! Every file this workspace overwrites (cache entries, exchange arrays,
//! converted waveforms) goes through a sibling temporary file that is renamed
//! over the destination, so a terminated worker leaves either the old content
//! or the new content under the final name, never a prefix of the new one.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{DompteurError, Result};

/// Create a temporary file in the destination's directory
pub fn sibling_temp(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}

/// Rename a finished temporary file over `path`
pub fn commit(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path).map_err(|e| DompteurError::Io(e.error))?;
    Ok(())
}

/// Replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = sibling_temp(path)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    commit(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");

        write_atomic(&path, b"1,2,3\n").unwrap();
        write_atomic(&path, b"4,5\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4,5\n");
        // Only the destination remains, no stray temporaries
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
