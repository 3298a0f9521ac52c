//! Destination directory preparation

use std::fs;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, RescaleError};

/// Ensures a clean destination directory before a run.
///
/// Not safe to call while writers target the same directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputManager;

impl OutputManager {
    pub fn new() -> Self {
        Self
    }

    /// Create `dest` (with ancestors) or delete every file below it.
    ///
    /// Sub-directories are kept; only files are removed. Calling this twice
    /// in a row is equivalent to calling it once.
    pub fn prepare(&self, dest: &Path) -> Result<()> {
        match fs::metadata(dest) {
            Ok(meta) if meta.is_dir() => {
                let removed = self.clear_files(dest)?;
                info!("Cleared {} file(s) from {:?}", removed, dest);
            }
            Ok(_) => {
                return Err(RescaleError::prepare(
                    dest,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
                ));
            }
            Err(_) => {
                fs::create_dir_all(dest).map_err(|e| RescaleError::prepare(dest, e))?;
                info!("Created output directory {:?}", dest);
            }
        }

        Ok(())
    }

    fn clear_files(&self, dest: &Path) -> Result<usize> {
        let mut removed = 0;

        for entry in WalkDir::new(dest).follow_links(false) {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
                RescaleError::prepare(dest, source)
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            fs::remove_file(entry.path()).map_err(|e| RescaleError::prepare(entry.path(), e))?;
            debug!("Removed {:?}", entry.path());
            removed += 1;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_missing_directory_with_ancestors() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a/b/out");

        OutputManager::new().prepare(&dest).unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn test_removes_files_recursively() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        fs::create_dir_all(dest.join("sub")).unwrap();
        fs::write(dest.join("old.jpg"), b"x").unwrap();
        fs::write(dest.join("sub/older.jpg"), b"x").unwrap();

        OutputManager::new().prepare(&dest).unwrap();

        assert!(dest.is_dir());
        assert!(!dest.join("old.jpg").exists());
        assert!(!dest.join("sub/older.jpg").exists());
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let manager = OutputManager::new();

        manager.prepare(&dest).unwrap();
        fs::write(dest.join("a.jpg"), b"x").unwrap();
        manager.prepare(&dest).unwrap();
        manager.prepare(&dest).unwrap();

        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_file_in_place_of_directory() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        fs::write(&dest, b"x").unwrap();

        let err = OutputManager::new().prepare(&dest).unwrap_err();
        assert!(matches!(err, RescaleError::PrepareFailure { .. }));
    }
}
