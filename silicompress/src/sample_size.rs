//! Subsampling factor for reduced-resolution decodes

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::error::Error;

/// Pixel dimensions of an image, either probed or requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn ensure_positive(&self, what: &str) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid(format!(
                "{what} dimensions must be positive, got {self}"
            )));
        }
        Ok(())
    }
}

impl From<(u32, u32)> for ImageDimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Divisor a decoder applies to both width and height. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleFactor(u32);

impl SampleFactor {
    pub const ONE: SampleFactor = SampleFactor(1);

    pub fn new(factor: u32) -> Option<Self> {
        (factor >= 1).then_some(SampleFactor(factor))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Dimensions after subsampling. Rounds up so no side collapses to zero.
    pub fn apply(self, dims: ImageDimensions) -> ImageDimensions {
        ImageDimensions {
            width: dims.width.div_ceil(self.0),
            height: dims.height.div_ceil(self.0),
        }
    }
}

impl fmt::Display for SampleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Compute the subsampling factor for decoding `original` towards `requested`.
///
/// Starts from the smaller of the rounded per-axis ratios, then grows until
/// the decoded area is at most twice the requested area.
pub fn compute(original: ImageDimensions, requested: ImageDimensions) -> Result<SampleFactor, Error> {
    original.ensure_positive("original")?;
    requested.ensure_positive("requested")?;

    let mut factor = 1u32;

    if original.height > requested.height || original.width > requested.width {
        let height_ratio = rounded_ratio(original.height, requested.height);
        let width_ratio = rounded_ratio(original.width, requested.width);
        factor = height_ratio.min(width_ratio);
    }

    let total_pixels = original.area() as f64;
    let total_requested_cap = requested.area() as f64 * 2.0;

    // a zero start divides to infinity, so this always leaves factor >= 1
    while total_pixels / (f64::from(factor) * f64::from(factor)) > total_requested_cap {
        factor += 1;
    }

    log::trace!("Sample factor {factor} for {original} -> {requested}");

    Ok(SampleFactor(factor))
}

#[inline]
fn rounded_ratio(value: u32, target: u32) -> u32 {
    (f64::from(value) / f64::from(target)).round() as u32
}
