//! Image probing and decoding

use anyhow::{Context, Result};
use imageproc::image::{DynamicImage, ImageDecoder, ImageReader};

use std::path::Path;

use crate::sample_size::ImageDimensions;

/// Read only the header to get the stored pixel dimensions.
///
/// These are pre-orientation: a portrait photo tagged with a 90 degree EXIF
/// rotation reports its landscape sensor size.
pub fn probe(path: &Path) -> Result<ImageDimensions> {
    let (width, height) = ImageReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .with_guessed_format()?
        .into_dimensions()
        .with_context(|| format!("Failed to read image header of {}", path.display()))?;

    Ok(ImageDimensions::new(width, height))
}

/// Decode a file, applying its EXIF orientation
pub fn decode(path: &Path) -> Result<DynamicImage> {
    let mut decoder = ImageReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .with_guessed_format()?
        .into_decoder()
        .with_context(|| format!("Unsupported image format: {}", path.display()))?;

    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    img.apply_orientation(orientation);

    Ok(img)
}

/// Decode from memory. No orientation handling.
pub fn decode_bytes(data: &[u8]) -> Result<DynamicImage> {
    imageproc::image::load_from_memory(data).map_err(Into::into)
}
