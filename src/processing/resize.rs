//! Resize engine: scale a decoded image onto a fresh destination buffer

use image::{imageops, DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use tracing::debug;

use crate::config::{FilterKind, ProcessingConfig};
use crate::error::{Result, RescaleError};
use crate::processing::Dimensions;

/// High-quality image resizer.
///
/// The engine owns the destination allocation, the interpolation mode and
/// the lifetime of the produced buffer; sampling itself is delegated to
/// `image::imageops`.
#[derive(Debug, Clone)]
pub struct ResizeEngine {
    filter: FilterKind,
    background: Rgb<u8>,
}

impl ResizeEngine {
    /// Create a new resizer with default settings (bicubic, black background)
    pub fn new() -> Self {
        Self {
            filter: FilterKind::CatmullRom,
            background: Rgb([0, 0, 0]),
        }
    }

    /// Create a resizer from processing configuration
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            filter: config.filter,
            background: Rgb(config.background),
        }
    }

    /// Create a resizer with custom filter
    pub fn with_filter(mut self, filter: FilterKind) -> Self {
        self.filter = filter;
        self
    }

    /// Set the colour that transparent pixels are flattened onto
    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = Rgb(background);
        self
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    /// Resize `source` from `source_dims` to exactly `dest_dims`.
    ///
    /// A transparent canvas of `dest_dims` is allocated, the source is drawn
    /// scaled to fill it, and the result is flattened onto the background so
    /// it can go straight to a JPEG encoder. `source` is never modified.
    pub fn resize(
        &self,
        source: &DynamicImage,
        source_dims: Dimensions,
        dest_dims: Dimensions,
    ) -> Result<ResizedImage> {
        if dest_dims.is_empty() {
            return Err(RescaleError::InvalidDimension {
                path: None,
                width: u64::from(dest_dims.width),
                height: u64::from(dest_dims.height),
                scale: dest_dims.ratio_to(source_dims),
            });
        }

        if Dimensions::of(source) != source_dims {
            return Err(RescaleError::invalid_parameters(format!(
                "Source dimensions {} do not match decoded image {}",
                source_dims,
                Dimensions::of(source)
            )));
        }

        debug!(
            "Resizing {} -> {} using {:?}",
            source_dims, dest_dims, self.filter
        );

        let mut canvas = RgbaImage::from_pixel(dest_dims.width, dest_dims.height, Rgba([0, 0, 0, 0]));
        {
            let scaled = source
                .resize_exact(dest_dims.width, dest_dims.height, self.filter.into())
                .into_rgba8();
            imageops::overlay(&mut canvas, &scaled, 0, 0);
        }

        let Rgb([r, g, b]) = self.background;
        let mut flattened = RgbaImage::from_pixel(dest_dims.width, dest_dims.height, Rgba([r, g, b, 255]));
        imageops::overlay(&mut flattened, &canvas, 0, 0);
        drop(canvas);

        Ok(ResizedImage {
            pixels: DynamicImage::ImageRgba8(flattened).into_rgb8(),
        })
    }
}

impl Default for ResizeEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque RGB pixel buffer produced by the engine, ready for JPEG encoding
#[derive(Debug)]
pub struct ResizedImage {
    pixels: RgbImage,
}

impl ResizedImage {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixels.width(), self.pixels.height())
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_inner(self) -> RgbImage {
        self.pixels
    }
}
