//! Resampling to the fixed working resolution.
//!
//! Every source image and mask is stretched to the same square raster
//! before any per-pixel comparison, so masks produced at a different
//! size than the photograph still line up pixel for pixel and memory
//! stays bounded regardless of the upload size.
//!
//! Source images and masks must go through the same filter; mixing
//! filters shifts edges by a fraction of a pixel and the cutout drifts
//! off its mask.

use std::borrow::Cow;
use std::fmt;

use image::imageops;
use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Resampling filter used when stretching to the working resolution.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, keeps binary masks binary.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> imageops::FilterType {
        match self {
            Self::Nearest => imageops::FilterType::Nearest,
            Self::Triangle => imageops::FilterType::Triangle,
            Self::CatmullRom => imageops::FilterType::CatmullRom,
            Self::Gaussian => imageops::FilterType::Gaussian,
            Self::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Target raster for all per-pixel work: a `side`×`side` square and the
/// filter used to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingResolution {
    /// Side length in pixels.
    pub side: u32,
    /// Filter shared by every resample.
    pub filter: ResampleFilter,
}

impl WorkingResolution {
    /// Create a working resolution.
    #[must_use]
    pub const fn new(side: u32, filter: ResampleFilter) -> Self {
        Self { side, filter }
    }

    /// Stretch `image` to the working resolution.
    ///
    /// The aspect ratio is not preserved: the whole image is mapped onto
    /// the square, matching how every mask for the same photograph is
    /// mapped. Images already at the working size are borrowed as-is.
    #[must_use]
    pub fn apply<'a>(&self, image: &'a RgbaImage) -> Cow<'a, RgbaImage> {
        if image.dimensions() == (self.side, self.side) {
            return Cow::Borrowed(image);
        }
        Cow::Owned(imageops::resize(
            image,
            self.side,
            self.side,
            self.filter.to_image_filter(),
        ))
    }
}

impl Default for WorkingResolution {
    fn default() -> Self {
        Self::new(512, ResampleFilter::default())
    }
}

impl From<&crate::types::SceneConfig> for WorkingResolution {
    fn from(config: &crate::types::SceneConfig) -> Self {
        Self::new(config.working_resolution, config.resample_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn matching_size_is_borrowed() {
        let img = test_image(64, 64);
        let working = WorkingResolution::new(64, ResampleFilter::Triangle);
        assert!(matches!(working.apply(&img), Cow::Borrowed(_)));
    }

    #[test]
    fn landscape_is_stretched_to_square() {
        let img = test_image(300, 100);
        let working = WorkingResolution::new(64, ResampleFilter::Triangle);
        let out = working.apply(&img);
        assert_eq!(out.dimensions(), (64, 64));
    }

    #[test]
    fn small_image_is_upsampled() {
        let img = test_image(8, 16);
        let working = WorkingResolution::new(32, ResampleFilter::Nearest);
        let out = working.apply(&img);
        assert_eq!(out.dimensions(), (32, 32));
        assert_eq!(out.get_pixel(31, 31).0, [128, 128, 128, 255]);
    }

    #[test]
    fn nearest_keeps_binary_values() {
        let img = RgbaImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let working = WorkingResolution::new(16, ResampleFilter::Nearest);
        let out = working.apply(&img);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn display_names() {
        assert_eq!(ResampleFilter::CatmullRom.to_string(), "CatmullRom");
        assert_eq!(ResampleFilter::Lanczos3.to_string(), "Lanczos3");
    }
}
