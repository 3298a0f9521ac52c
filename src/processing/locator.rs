//! Recursive discovery of source images

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, RescaleError};
use crate::processing::formats::SUPPORTED_EXTENSIONS;

/// Finds candidate images under a directory tree by extension.
#[derive(Debug, Clone)]
pub struct ImageLocator {
    extensions: Vec<String>,
}

impl ImageLocator {
    /// Locator for `.png`, `.jpg` and `.jpeg`
    pub fn new() -> Self {
        Self {
            extensions: SUPPORTED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    /// Recursively find every qualifying file under `root`.
    ///
    /// The result is sorted and free of duplicates. A missing or unreadable
    /// root is an error; unreadable entries below it are skipped with a warning.
    pub fn find_images(&self, root: &Path) -> Result<Vec<PathBuf>> {
        check_root(root)?;

        let mut files = scan(root, |ext| self.extensions.iter().any(|e| e.as_str() == ext))?;
        files.sort();
        files.dedup();

        debug!("Found {} images under {:?}", files.len(), root);
        Ok(files)
    }

    /// Same contract as [`find_images`](Self::find_images), but issues one
    /// scan per extension concurrently and joins the results afterwards.
    pub fn find_images_concurrent(&self, root: &Path) -> Result<Vec<PathBuf>> {
        check_root(root)?;

        let per_extension: Vec<Vec<PathBuf>> = self
            .extensions
            .par_iter()
            .map(|wanted| scan(root, |ext| ext == wanted.as_str()))
            .collect::<Result<_>>()?;

        let mut files: Vec<PathBuf> = per_extension.into_iter().flatten().collect();
        files.sort();
        files.dedup();

        debug!("Found {} images under {:?} (concurrent scan)", files.len(), root);
        Ok(files)
    }
}

impl Default for ImageLocator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_root(root: &Path) -> Result<()> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(RescaleError::directory_not_found(root)),
    }
}

fn scan<F>(root: &Path, matches: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(RescaleError::directory_not_found(root)),
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };

        if !is_regular_file(&entry) {
            continue;
        }

        let qualifies = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(&matches)
            .unwrap_or(false);

        if qualifies {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Plain files, plus symlinks that resolve to a file.
///
/// Linked directories are never descended.
fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    let file_type = entry.file_type();
    if !file_type.is_symlink() {
        return file_type.is_file();
    }

    match std::fs::metadata(entry.path()) {
        Ok(meta) if meta.is_file() => true,
        Ok(_) => {
            debug!("Not descending into linked directory {:?}", entry.path());
            false
        }
        Err(e) => {
            debug!("Skipping dangling symlink {:?}: {}", entry.path(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in [
            "a.png",
            "b.jpg",
            "nested/c.jpeg",
            "nested/deeper/d.png",
            "notes.txt",
            "upper.PNG",
            "archive.png.bak",
            "noext",
        ] {
            touch(dir.path(), name);
        }
        fs::create_dir_all(dir.path().join("folder.png")).unwrap();
        dir
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_find_images_recursive() {
        let dir = tree();
        let files = ImageLocator::new().find_images(dir.path()).unwrap();
        assert_eq!(
            names(dir.path(), &files),
            vec!["a.png", "b.jpg", "nested/c.jpeg", "nested/deeper/d.png"]
        );
    }

    #[test]
    fn test_concurrent_scan_matches_sequential() {
        let dir = tree();
        let locator = ImageLocator::new();
        assert_eq!(
            locator.find_images(dir.path()).unwrap(),
            locator.find_images_concurrent(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = ImageLocator::new().find_images(&missing).unwrap_err();
        assert!(matches!(err, RescaleError::DirectoryNotFound { .. }));

        let err = ImageLocator::new().find_images_concurrent(&missing).unwrap_err();
        assert!(matches!(err, RescaleError::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_file_as_root_is_an_error() {
        let dir = tree();
        let err = ImageLocator::new().find_images(&dir.path().join("a.png")).unwrap_err();
        assert!(matches!(err, RescaleError::DirectoryNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_found() {
        use std::os::unix::fs::symlink;

        let dir = tree();
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "linked.png");
        touch(outside.path(), "inner/hidden.jpg");

        symlink(outside.path().join("linked.png"), dir.path().join("link.png")).unwrap();
        symlink(outside.path().join("inner"), dir.path().join("linked_dir")).unwrap();
        symlink(dir.path().join("gone.png"), dir.path().join("dangling.png")).unwrap();

        let locator = ImageLocator::new();
        let files = locator.find_images(dir.path()).unwrap();
        assert_eq!(
            names(dir.path(), &files),
            vec!["a.png", "b.jpg", "link.png", "nested/c.jpeg", "nested/deeper/d.png"]
        );
        assert_eq!(files, locator.find_images_concurrent(dir.path()).unwrap());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(ImageLocator::new().find_images(dir.path()).unwrap().is_empty());
    }
}
