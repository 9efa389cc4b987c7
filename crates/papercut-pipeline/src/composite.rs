//! Cutout compositing: reveal the source image through one mask.
//!
//! Both rasters are brought to the working resolution, then every pixel
//! is classified by the mask's red channel alone: above the threshold
//! the source color is copied with full opacity, otherwise the pixel is
//! fully transparent. There is no partial alpha, so the renderer's
//! alpha test never has to guess at soft mask edges.

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::resample::WorkingResolution;
use crate::types::{Dimensions, PipelineError, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Inclusive pixel rectangle covering every foreground pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    /// Leftmost foreground column.
    pub min_x: u32,
    /// Topmost foreground row.
    pub min_y: u32,
    /// Rightmost foreground column.
    pub max_x: u32,
    /// Bottommost foreground row.
    pub max_y: u32,
}

impl PixelBounds {
    fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Width of the rectangle in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Height of the rectangle in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// A composited layer texture: source colors where the mask is
/// foreground, transparent elsewhere.
#[derive(Debug, Clone)]
pub struct Cutout {
    /// RGBA texture at the working resolution.
    pub texture: RgbaImage,
    /// Number of opaque pixels in `texture`. Always at least 1.
    pub foreground_pixels: u64,
    /// Extent of the opaque silhouette.
    pub bounds: PixelBounds,
}

impl Cutout {
    /// Texture dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.texture.width(),
            height: self.texture.height(),
        }
    }

    /// Fraction of the texture that is opaque, from 0.0 to 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage(&self) -> f64 {
        let total = self.dimensions().pixel_count();
        if total == 0 {
            0.0
        } else {
            self.foreground_pixels as f64 / total as f64
        }
    }
}

/// Composite `source` through `mask`.
///
/// A pixel is foreground when the mask's red channel is strictly greater
/// than `threshold`. The result is a pure function of its inputs.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyLayer`] if no pixel passes the
/// threshold; callers skip such layers rather than emit an invisible
/// panel.
pub fn composite(
    source: &RgbaImage,
    mask: &RgbaImage,
    threshold: u8,
    working: WorkingResolution,
) -> Result<Cutout, PipelineError> {
    let source = working.apply(source);
    let mask = working.apply(mask);

    let mut texture = RgbaImage::from_pixel(working.side, working.side, TRANSPARENT);
    let mut foreground_pixels = 0_u64;
    let mut bounds: Option<PixelBounds> = None;

    for (x, y, m) in mask.enumerate_pixels() {
        if m.0[0] <= threshold {
            continue;
        }
        let [r, g, b, _] = source.get_pixel(x, y).0;
        texture.put_pixel(x, y, Rgba([r, g, b, 255]));
        foreground_pixels += 1;
        match bounds.as_mut() {
            Some(bounds) => bounds.include(x, y),
            None => bounds = Some(PixelBounds::point(x, y)),
        }
    }

    let bounds = bounds.ok_or(PipelineError::EmptyLayer)?;
    Ok(Cutout {
        texture,
        foreground_pixels,
        bounds,
    })
}

/// Count mask pixels whose red channel is strictly above `threshold`.
#[must_use]
pub fn count_foreground(mask: &RgbaImage, threshold: u8) -> u64 {
    mask.pixels()
        .map(|p| u64::from(u8::from(p.0[0] > threshold)))
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resample::ResampleFilter;

    const WORKING: WorkingResolution = WorkingResolution::new(16, ResampleFilter::Nearest);

    #[allow(clippy::cast_possible_truncation)]
    fn source() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 77, 255]))
    }

    /// Horizontal gradient mask: red channel = x * 16.
    #[allow(clippy::cast_possible_truncation)]
    fn gradient_mask() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, _| {
            let v = (x * 16) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn foreground_copies_source_and_is_opaque() {
        let mask = RgbaImage::from_fn(16, 16, |x, _| {
            if x >= 8 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let cutout = composite(&source(), &mask, 100, WORKING).unwrap();
        assert_eq!(cutout.texture.get_pixel(10, 3).0, [100, 30, 77, 255]);
        assert_eq!(cutout.texture.get_pixel(2, 3).0[3], 0);
        assert_eq!(cutout.foreground_pixels, 8 * 16);
        assert_eq!(
            cutout.bounds,
            PixelBounds {
                min_x: 8,
                min_y: 0,
                max_x: 15,
                max_y: 15
            }
        );
        assert!((cutout.coverage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let mask = RgbaImage::from_pixel(16, 16, Rgba([100, 100, 100, 255]));
        assert!(matches!(
            composite(&source(), &mask, 100, WORKING),
            Err(PipelineError::EmptyLayer)
        ));
        assert!(composite(&source(), &mask, 99, WORKING).is_ok());
    }

    #[test]
    fn only_red_channel_is_read() {
        let mask = RgbaImage::from_pixel(16, 16, Rgba([0, 255, 255, 255]));
        assert!(matches!(
            composite(&source(), &mask, 100, WORKING),
            Err(PipelineError::EmptyLayer)
        ));
    }

    #[test]
    fn empty_mask_is_empty_layer() {
        let mask = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
        assert!(matches!(
            composite(&source(), &mask, 100, WORKING),
            Err(PipelineError::EmptyLayer)
        ));
    }

    #[test]
    fn composite_is_deterministic() {
        let a = composite(&source(), &gradient_mask(), 100, WORKING).unwrap();
        let b = composite(&source(), &gradient_mask(), 100, WORKING).unwrap();
        assert_eq!(a.texture.as_raw(), b.texture.as_raw());
        assert_eq!(a.foreground_pixels, b.foreground_pixels);
    }

    #[test]
    fn raising_threshold_never_adds_foreground() {
        let mask = gradient_mask();
        let mut previous = u64::MAX;
        for threshold in (0..=250).step_by(10) {
            let count = composite(&source(), &mask, threshold, WORKING)
                .map_or(0, |c| c.foreground_pixels);
            assert!(
                count <= previous,
                "threshold {threshold} produced {count} > {previous}"
            );
            assert_eq!(count, count_foreground(&mask, threshold));
            previous = count;
        }
    }

    #[test]
    fn mismatched_sizes_are_resampled_to_working_resolution() {
        let small_mask = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let big_source = RgbaImage::from_pixel(40, 20, Rgba([1, 2, 3, 255]));
        let cutout = composite(&big_source, &small_mask, 100, WORKING).unwrap();
        assert_eq!(cutout.texture.dimensions(), (16, 16));
        assert_eq!(cutout.foreground_pixels, 256);
        assert_eq!(cutout.texture.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn count_foreground_counts_strictly_above() {
        let mask = gradient_mask();
        // Columns 0..=6 have red <= 96 (x * 16), so columns 7..=15 pass 100.
        assert_eq!(count_foreground(&mask, 100), 9 * 16);
    }
}
