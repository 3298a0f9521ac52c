//! Core image processing: data model and the per-file unit of work

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorContext, Result, RescaleError};

pub mod formats;
pub mod locator;
pub mod output;
pub mod resize;

pub use formats::*;
pub use locator::ImageLocator;
pub use output::OutputManager;
pub use resize::{ResizeEngine, ResizedImage};

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a decoded image
    pub fn of(image: &DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// True if either axis is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `floor(axis * scale)` for each axis independently.
    ///
    /// Fails with `InvalidDimension` when an axis floors to zero or no longer
    /// fits in a `u32`.
    pub fn scale_by(self, scale: f64) -> Result<Self> {
        let width = (f64::from(self.width) * scale).floor();
        let height = (f64::from(self.height) * scale).floor();

        let fits = |v: f64| v.is_finite() && v >= 1.0 && v <= f64::from(u32::MAX);
        if !fits(width) || !fits(height) {
            return Err(RescaleError::InvalidDimension {
                path: None,
                width: width as u64,
                height: height as u64,
                scale,
            });
        }

        Ok(Self::new(width as u32, height as u32))
    }

    /// Width ratio of `self` to `other`
    pub(crate) fn ratio_to(self, other: Dimensions) -> f64 {
        if other.width == 0 {
            return 0.0;
        }
        f64::from(self.width) / f64::from(other.width)
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One source image to rescale, with its derived destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeTask {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub scale: f64,
}

impl ResizeTask {
    /// Build a task writing `<output_dir>/<source stem>.jpg`
    pub fn new(source: impl Into<PathBuf>, output_dir: &Path, scale: f64) -> Self {
        let source = source.into();
        let dest = dest_path_for(&source, output_dir);
        Self { source, dest, scale }
    }
}

/// Destination path for a source image: basename without extension plus `.jpg`
pub fn dest_path_for(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .or_else(|| source.file_name())
        .unwrap_or_default();

    let mut name = stem.to_os_string();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    output_dir.join(name)
}

/// A successfully completed unit of work
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub source_dims: Dimensions,
    pub dest_dims: Dimensions,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

/// Encoded output held between the CPU stage and the write
#[derive(Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub source_dims: Dimensions,
    pub dest_dims: Dimensions,
}

/// Decode, resize and encode one source image held in memory.
///
/// The decoded source and the resized buffer are owned by this call and
/// dropped before it returns, on success and on every error path.
pub fn render(task: &ResizeTask, data: &[u8], engine: &ResizeEngine, quality: u8) -> Result<EncodedImage> {
    let (resized, source_dims) = {
        let decoded = decode(&task.source, data)?;
        let source_dims = Dimensions::of(&decoded);
        let dest_dims = source_dims.scale_by(task.scale).with_file_context(&task.source)?;

        debug!("{:?}: {} -> {}", task.source, source_dims, dest_dims);

        let resized = engine
            .resize(&decoded, source_dims, dest_dims)
            .with_file_context(&task.source)?;
        (resized, source_dims)
    };

    let bytes = encode_jpeg(&task.source, &resized, quality)?;
    let dest_dims = resized.dimensions();
    drop(resized);

    Ok(EncodedImage {
        bytes,
        source_dims,
        dest_dims,
    })
}

/// Run one complete unit of work synchronously: read, render, write.
pub fn process_task(task: &ResizeTask, engine: &ResizeEngine, quality: u8) -> Result<UnitOutcome> {
    let start = Instant::now();

    let data = std::fs::read(&task.source).with_file_context(&task.source)?;
    let encoded = render(task, &data, engine, quality)?;
    drop(data);

    std::fs::write(&task.dest, &encoded.bytes)
        .map_err(|e| RescaleError::write(&task.source, &task.dest, e))?;

    Ok(task.outcome(&encoded, start.elapsed()))
}

impl ResizeTask {
    pub(crate) fn outcome(&self, encoded: &EncodedImage, elapsed: Duration) -> UnitOutcome {
        UnitOutcome {
            source: self.source.clone(),
            dest: self.dest.clone(),
            source_dims: encoded.source_dims,
            dest_dims: encoded.dest_dims,
            bytes_written: encoded.bytes.len() as u64,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, Rgba([90, 120, 150, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_scale_by_floors_each_axis() {
        let dims = Dimensions::new(100, 50);
        assert_eq!(dims.scale_by(2.0).unwrap(), Dimensions::new(200, 100));
        assert_eq!(Dimensions::new(33, 7).scale_by(0.5).unwrap(), Dimensions::new(16, 3));
        assert_eq!(Dimensions::new(3, 3).scale_by(1.5).unwrap(), Dimensions::new(4, 4));
    }

    #[test]
    fn test_scale_by_rejects_degenerate_targets() {
        let err = Dimensions::new(10, 10).scale_by(0.001).unwrap_err();
        assert!(matches!(err, RescaleError::InvalidDimension { width: 0, height: 0, .. }));

        // One axis collapsing is enough
        assert!(Dimensions::new(100, 1).scale_by(0.5).is_err());
        assert!(Dimensions::new(u32::MAX, 1).scale_by(2.0).is_err());
    }

    #[test]
    fn test_dest_path_for() {
        let out = Path::new("/out");
        assert_eq!(dest_path_for(Path::new("/src/a.png"), out), PathBuf::from("/out/a.jpg"));
        assert_eq!(dest_path_for(Path::new("/src/x/b.jpeg"), out), PathBuf::from("/out/b.jpg"));
        assert_eq!(dest_path_for(Path::new("c.tar.png"), out), PathBuf::from("/out/c.tar.jpg"));
    }

    #[test]
    fn test_resize_task_new() {
        let task = ResizeTask::new("/src/photo.png", Path::new("/dst"), 0.5);
        assert_eq!(task.dest, PathBuf::from("/dst/photo.jpg"));
        assert_eq!(task.scale, 0.5);
    }

    #[test]
    fn test_process_task_writes_scaled_jpeg() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        write_png(&source, 100, 50);

        let task = ResizeTask::new(&source, dir.path(), 2.0);
        let outcome = process_task(&task, &ResizeEngine::new(), 90).unwrap();

        assert_eq!(outcome.source_dims, Dimensions::new(100, 50));
        assert_eq!(outcome.dest_dims, Dimensions::new(200, 100));
        assert!(outcome.bytes_written > 0);

        let written = image::open(dir.path().join("a.jpg")).unwrap();
        assert_eq!((written.width(), written.height()), (200, 100));
    }

    #[test]
    fn test_process_task_invalid_dimension_is_attributed() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("tiny.png");
        write_png(&source, 10, 10);

        let task = ResizeTask::new(&source, dir.path(), 0.001);
        let err = process_task(&task, &ResizeEngine::new(), 90).unwrap_err();

        assert!(matches!(err, RescaleError::InvalidDimension { .. }));
        assert_eq!(err.file_path(), Some(source.as_path()));
        assert!(!dir.path().join("tiny.jpg").exists());
    }

    #[test]
    fn test_process_task_missing_source() {
        let dir = TempDir::new().unwrap();
        let task = ResizeTask::new(dir.path().join("gone.png"), dir.path(), 2.0);
        let err = process_task(&task, &ResizeEngine::new(), 90).unwrap_err();
        assert!(matches!(err, RescaleError::WriteFailure { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_process_task_missing_output_dir() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        write_png(&source, 4, 4);

        let task = ResizeTask::new(&source, &dir.path().join("no/such/dir"), 1.0);
        let err = process_task(&task, &ResizeEngine::new(), 90).unwrap_err();
        match err {
            RescaleError::WriteFailure { path, target, .. } => {
                assert_eq!(path, source);
                assert_eq!(target, task.dest);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
