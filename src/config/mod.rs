//! Configuration management for Rescaler

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Result, RescaleError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resize and scheduling settings
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Resize and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Multiplier applied independently to width and height
    pub scale: f64,

    /// JPEG output quality (1-100)
    pub quality: u8,

    /// Worker count for the parallel-worker strategy (None = available parallelism)
    pub threads: Option<usize>,

    /// Cap on concurrently running units for fan-out strategies (None or 0 = unbounded)
    pub max_in_flight: Option<usize>,

    /// Partition length for the data-parallel strategy (None = files / cores)
    pub partition_size: Option<usize>,

    /// Scan one extension per thread and merge the results
    pub concurrent_scan: bool,

    /// RGB colour that transparent source pixels are flattened onto
    pub background: [u8; 3],

    /// Interpolation filter used by the resize engine
    pub filter: FilterKind,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            quality: 90,
            threads: None,
            max_in_flight: Some(num_cpus::get() * 2),
            partition_size: None,
            concurrent_scan: false,
            background: [0, 0, 0],
            filter: FilterKind::CatmullRom,
        }
    }
}

impl ProcessingConfig {
    /// Worker count for bounded strategies
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Fan-out cap, `None` meaning unbounded
    pub fn fan_out_limit(&self) -> Option<usize> {
        self.max_in_flight.filter(|&limit| limit > 0)
    }
}

/// High-quality interpolation filters accepted by the resize engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Bilinear
    Triangle,
    /// Bicubic (Catmull-Rom spline)
    CatmullRom,
    /// Lanczos with radius 3
    Lanczos3,
}

impl From<FilterKind> for image::imageops::FilterType {
    fn from(filter: FilterKind) -> Self {
        match filter {
            FilterKind::Triangle => image::imageops::FilterType::Triangle,
            FilterKind::CatmullRom => image::imageops::FilterType::CatmullRom,
            FilterKind::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = RescaleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmull-rom" | "bicubic" => Ok(Self::CatmullRom),
            "lanczos3" => Ok(Self::Lanczos3),
            "nearest" => Err(RescaleError::invalid_parameters(
                "Nearest-neighbour sampling is not a high-quality filter",
            )),
            other => Err(RescaleError::invalid_parameters(format!(
                "Unknown filter '{}'. Use triangle, catmull-rom or lanczos3",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| RescaleError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let config: Config = match extension_of(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            _ => return Err(RescaleError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match extension_of(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| RescaleError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| RescaleError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(RescaleError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| RescaleError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.processing.validate()
    }
}

impl ProcessingConfig {
    /// Reject values no strategy can run with
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RescaleError::config(
                format!("Scale factor must be a positive number, got {}", self.scale)
            ));
        }

        if !(1..=100).contains(&self.quality) {
            return Err(RescaleError::config(
                "Quality must be between 1 and 100"
            ));
        }

        if self.threads == Some(0) {
            return Err(RescaleError::config(
                "Thread count must be greater than 0"
            ));
        }

        if self.partition_size == Some(0) {
            return Err(RescaleError::config(
                "Partition size must be greater than 0"
            ));
        }

        Ok(())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
