//! Image encoding: JPEG, PNG, WebP

use anyhow::{Context, Result};
use imageproc::image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder};

use std::borrow::Cow;

use super::{ImageFormat, PngCompression};

/// Compress an image to JPEG format with the specified quality
pub fn compress_to_jpeg<W>(img: &DynamicImage, writer: &mut W, quality: u8) -> Result<()>
where
    W: std::io::Write,
{
    let encoder = imageproc::image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);

    // JPEG has no alpha channel
    let converted;
    let (data, color) = match img {
        DynamicImage::ImageLuma8(gray) => (gray.as_raw(), ExtendedColorType::L8),
        DynamicImage::ImageRgb8(rgb) => (rgb.as_raw(), ExtendedColorType::Rgb8),
        other => {
            converted = other.to_rgb8();
            (converted.as_raw(), ExtendedColorType::Rgb8)
        }
    };

    encoder
        .write_image(data, img.width(), img.height(), color)
        .with_context(|| "Failed to compress image to JPEG")?;

    Ok(())
}

/// Compress an image to PNG format with the specified compression level
pub fn compress_to_png<W>(
    img: &DynamicImage,
    writer: &mut W,
    compression: PngCompression,
) -> Result<()>
where
    W: std::io::Write,
{
    use imageproc::image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let compression_type = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };

    let is_grayscale = img.color() == ColorType::L8 || img.color() == ColorType::La8;

    let encoder = PngEncoder::new_with_quality(
        writer,
        compression_type,
        if is_grayscale {
            FilterType::NoFilter
        } else {
            FilterType::Adaptive
        },
    );

    encoder
        .write_image(
            img.as_bytes(),
            img.width(),
            img.height(),
            img.color().into(),
        )
        .with_context(|| "Failed to compress image to PNG")?;

    Ok(())
}

/// Compress an image to WebP format with the specified quality
pub fn compress_to_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let img = if img.color().has_alpha() {
        DynamicImage::from(img.to_rgba8())
    } else {
        DynamicImage::from(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&img)
        .map_err(|e| anyhow::anyhow!("Failed to create WebP encoder: {}", e))?;
    let webp_data = encoder.encode(f32::from(quality));
    Ok(webp_data.to_vec())
}

/// Encode into a fresh buffer
pub fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    format.validate()?;

    let img = to_8bit(img);
    let mut buffer = Vec::with_capacity(img.width() as usize * img.height() as usize);

    match format {
        ImageFormat::Jpeg { quality } => compress_to_jpeg(&img, &mut buffer, quality)?,
        ImageFormat::Png { compression } => compress_to_png(&img, &mut buffer, compression)?,
        ImageFormat::WebP { quality } => buffer = compress_to_webp(&img, quality)?,
    }

    log::trace!(
        "Encoded {}x{} image as {} ({} bytes)",
        img.width(),
        img.height(),
        format.extension(),
        buffer.len()
    );

    Ok(buffer)
}

/// Encoders here take 8-bit samples only
fn to_8bit(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(img),
        color if color.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    }
}
