//! Error types and handling for Rescaler

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parallel::Strategy;

/// Result type alias for Rescaler operations
pub type Result<T> = std::result::Result<T, RescaleError>;

/// Main error type for Rescaler operations
#[derive(Debug, Error)]
pub enum RescaleError {
    /// Source root is missing, unreadable, or not a directory
    #[error("Directory not found: {path:?}")]
    DirectoryNotFound { path: PathBuf },

    /// Source bytes could not be decoded as PNG or JPEG
    #[error("Failed to decode {path:?}: {message}")]
    DecodeFailure { path: PathBuf, message: String },

    /// Scale factor produced a zero-sized or unrepresentable target
    #[error("Invalid target dimensions {width}x{height} (scale {scale}, file: {path:?})")]
    InvalidDimension {
        path: Option<PathBuf>,
        width: u64,
        height: u64,
        scale: f64,
    },

    /// Resized buffer could not be encoded as JPEG
    #[error("Failed to encode {path:?}: {message}")]
    EncodeFailure { path: PathBuf, message: String },

    /// Reading the source or writing the destination failed
    #[error("I/O failure on {target:?} while processing {path:?}: {source}")]
    WriteFailure {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A unit of work panicked; its siblings are unaffected
    #[error("Processing panicked for {path:?}: {message}")]
    UnitPanicked { path: PathBuf, message: String },

    /// Output directory could not be created or cleaned
    #[error("Failed to prepare output directory {path:?}: {source}")]
    PrepareFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors without a per-file attribution
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid resize parameters
    #[error("Invalid resize parameters: {message}")]
    InvalidParameters { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Parallel processing errors (worker panics, join failures)
    #[error("Parallel processing error: {message}")]
    ParallelError { message: String },

    /// The run was cancelled before every unit was issued
    #[error("Run cancelled: {skipped} file(s) not processed")]
    Cancelled { skipped: usize },

    /// One or more units failed; every unit settled before this was raised
    #[error("{strategy} run failed for {} file(s): {}", .failures.len(), FailureList(.failures))]
    Batch {
        strategy: Strategy,
        failures: Vec<RescaleError>,
    },
}

struct FailureList<'a>(&'a [RescaleError]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl RescaleError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new parallel processing error
    pub fn parallel<S: Into<String>>(message: S) -> Self {
        Self::ParallelError {
            message: message.into(),
        }
    }

    pub fn directory_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DirectoryNotFound { path: path.into() }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::DecodeFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn encode(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::EncodeFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// I/O failure on `target` while processing the source image at `path`
    pub fn write(path: impl Into<PathBuf>, target: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            target: target.into(),
            source,
        }
    }

    pub fn prepare(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PrepareFailure {
            path: path.into(),
            source,
        }
    }

    /// Check if the error is confined to a single file.
    ///
    /// Recoverable errors are isolated to their unit of work; everything else
    /// is fatal to the run and surfaces before any unit starts.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DecodeFailure { .. }
            | Self::InvalidDimension { .. }
            | Self::EncodeFailure { .. }
            | Self::WriteFailure { .. }
            | Self::UnitPanicked { .. } => true,

            Self::DirectoryNotFound { .. }
            | Self::PrepareFailure { .. }
            | Self::IoError(_)
            | Self::ConfigError { .. }
            | Self::InvalidParameters { .. }
            | Self::SerdeError(_)
            | Self::ParallelError { .. }
            | Self::Cancelled { .. }
            | Self::Batch { .. } => false,
        }
    }

    /// Get the source path the failure is attributed to, if any
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::DirectoryNotFound { path }
            | Self::DecodeFailure { path, .. }
            | Self::EncodeFailure { path, .. }
            | Self::WriteFailure { path, .. }
            | Self::UnitPanicked { path, .. }
            | Self::PrepareFailure { path, .. } => Some(path),
            Self::InvalidDimension { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Per-unit failures carried by a batch error (empty for any other variant)
    pub fn failures(&self) -> &[RescaleError] {
        match self {
            Self::Batch { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<toml::de::Error> for RescaleError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for RescaleError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

/// Error context extension for attributing failures to a source image
pub trait ErrorContext<T> {
    /// Attribute an error to `file`.
    ///
    /// Bare I/O errors become a `WriteFailure` on `file`; errors that carry
    /// an optional path get it filled in when missing.
    fn with_file_context(self, file: &Path) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<RescaleError>,
{
    fn with_file_context(self, file: &Path) -> Result<T> {
        self.map_err(|e| match e.into() {
            RescaleError::IoError(source) => RescaleError::write(file, file, source),
            RescaleError::InvalidDimension { path: None, width, height, scale } => {
                RescaleError::InvalidDimension {
                    path: Some(file.to_path_buf()),
                    width,
                    height,
                    scale,
                }
            }
            other => other,
        })
    }
}
