//! Image transformations: subsampling and aspect-fit downscaling

use anyhow::{Context, Result};
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use imageproc::image::{DynamicImage, RgbaImage};

use crate::sample_size::{ImageDimensions, SampleFactor};

/// Reduce an image by an integer factor, averaging each block of pixels
pub fn subsample(img: DynamicImage, factor: SampleFactor) -> Result<DynamicImage> {
    if factor == SampleFactor::ONE {
        return Ok(img);
    }

    let target = factor.apply(ImageDimensions::new(img.width(), img.height()));
    log::trace!(
        "Subsampling {}x{} by {factor} to {target}",
        img.width(),
        img.height()
    );

    resize(img, target, fr::ResizeAlg::Convolution(fr::FilterType::Box))
}

/// Largest size inside `max` with the aspect ratio of `src`.
///
/// Never upscales. Each side is at least one pixel.
pub fn fit_dimensions(src: ImageDimensions, max: ImageDimensions) -> ImageDimensions {
    if src.width <= max.width && src.height <= max.height {
        return src;
    }

    let width_ratio = f64::from(max.width) / f64::from(src.width);
    let height_ratio = f64::from(max.height) / f64::from(src.height);
    let ratio = width_ratio.min(height_ratio);

    let width = (f64::from(src.width) * ratio).round() as u32;
    let height = (f64::from(src.height) * ratio).round() as u32;

    ImageDimensions::new(width.clamp(1, max.width), height.clamp(1, max.height))
}

/// Downscale to fit within `max`, preserving aspect ratio
pub fn fit_within(img: DynamicImage, max: ImageDimensions) -> Result<DynamicImage> {
    let src = ImageDimensions::new(img.width(), img.height());
    let target = fit_dimensions(src, max);

    if target == src {
        return Ok(img);
    }

    log::trace!("Scaling {src} to {target}");

    // Lanczos3 preserves detail when shrinking
    resize(img, target, fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3))
}

fn resize(img: DynamicImage, target: ImageDimensions, algorithm: fr::ResizeAlg) -> Result<DynamicImage> {
    let had_alpha = img.color().has_alpha();
    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();

    let src_image = FrImage::from_vec_u8(width, height, rgba.into_raw(), fr::PixelType::U8x4)
        .context("Invalid source buffer")?;
    let mut dst_image = FrImage::new(target.width, target.height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            Some(&fr::ResizeOptions::new().resize_alg(algorithm)),
        )
        .with_context(|| format!("Failed to resize {width}x{height} to {target}"))?;

    let resized = RgbaImage::from_raw(target.width, target.height, dst_image.into_vec())
        .context("Resized buffer has unexpected length")?;

    let img = DynamicImage::ImageRgba8(resized);
    Ok(if had_alpha {
        img
    } else {
        DynamicImage::ImageRgb8(img.into_rgb8())
    })
}
