//! Image downscaling pipeline: probe, subsample, fit, encode

mod decode;
mod encode;
mod transform;

// Re-export public API
pub use decode::{decode, decode_bytes, probe};
pub use encode::{compress_to_jpeg, compress_to_png, compress_to_webp, encode};
pub use transform::{fit_dimensions, fit_within, subsample};

use anyhow::{Context, Result};
use rayon::prelude::*;

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::output;
use crate::sample_size::{self, ImageDimensions};

/// Largest output box, portrait, as (width, height)
pub const DEFAULT_MAX_DIMENSIONS: ImageDimensions = ImageDimensions::new(612, 816);
pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    Jpeg { quality: u8 },
    Png { compression: PngCompression },
    WebP { quality: u8 },
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg {
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png { .. } => "png",
            ImageFormat::WebP { .. } => "webp",
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ImageFormat::Jpeg { quality } | ImageFormat::WebP { quality }
                if !(1..=100).contains(quality) =>
            {
                Err(Error::invalid(format!(
                    "quality must be between 1 and 100, got {quality}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// One image to compress
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub source: PathBuf,
    pub destination_dir: PathBuf,
    pub max_dimensions: ImageDimensions,
    pub format: ImageFormat,
}

impl ImageRequest {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination_dir: destination_dir.into(),
            max_dimensions: DEFAULT_MAX_DIMENSIONS,
            format: ImageFormat::default(),
        }
    }

    pub fn max_dimensions(mut self, max: ImageDimensions) -> Self {
        self.max_dimensions = max;
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::invalid("source path is empty"));
        }
        if self.max_dimensions.width == 0 || self.max_dimensions.height == 0 {
            return Err(Error::invalid(format!(
                "max dimensions must be positive, got {}",
                self.max_dimensions
            )));
        }
        self.format.validate()
    }
}

/// Downscale in memory: subsampled decode followed by an aspect-fit resize
pub fn downscale(path: &Path, max: ImageDimensions) -> Result<imageproc::image::DynamicImage> {
    let original = probe(path)?;
    let factor = sample_size::compute(original, max)?;

    log::debug!(
        "{}: {original}, sample factor {factor}",
        path.display()
    );

    let img = decode(path)?;
    let img = subsample(img, factor)?;
    fit_within(img, max)
}

/// Compress one image into its destination directory, returning the written path
pub fn compress_image(request: &ImageRequest) -> Result<PathBuf> {
    request.validate()?;

    if !request.source.is_file() {
        return Err(Error::SourceNotReadable(request.source.clone()).into());
    }

    let img = downscale(&request.source, request.max_dimensions)?;
    let data = encode(&img, request.format)
        .with_context(|| format!("Failed to encode {}", request.source.display()))?;

    let path = output::write_timestamped(
        &request.destination_dir,
        "IMG",
        output::IMAGE_TIMESTAMP,
        request.format.extension(),
        &data,
    )?;

    log::info!(
        "Compressed {} -> {} ({}x{}, {} bytes)",
        request.source.display(),
        path.display(),
        img.width(),
        img.height(),
        data.len()
    );

    Ok(path)
}

/// Compress many images in parallel. One result per request, in order.
pub fn compress_images(requests: &[ImageRequest]) -> Vec<Result<PathBuf>> {
    log::info!("Compressing {} images", requests.len());
    log::debug!("Using {} threads", rayon::current_num_threads());

    requests
        .par_iter()
        .map(|request| {
            compress_image(request).inspect_err(|e| {
                log::warn!("Failed to compress {}: {:#}", request.source.display(), e)
            })
        })
        .collect()
}
