//! Merge engine: union two masks into one binary mask.
//!
//! The union is binarized rather than alpha-blended. Overlaying two soft
//! masks yields intermediate values that the compositor's single
//! threshold would split unpredictably; a binary union composites the
//! same way every time.

use image::Rgba;

use crate::resample::WorkingResolution;
use crate::types::RgbaImage;

const INCLUDED: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EXCLUDED: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Union `a` and `b` at the working resolution.
///
/// A pixel is included (opaque white) when either mask's red channel is
/// strictly greater than `threshold`, and excluded (transparent black)
/// otherwise.
#[must_use]
pub fn merge_masks(
    a: &RgbaImage,
    b: &RgbaImage,
    threshold: u8,
    working: WorkingResolution,
) -> RgbaImage {
    let a = working.apply(a);
    let b = working.apply(b);
    RgbaImage::from_fn(working.side, working.side, |x, y| {
        if a.get_pixel(x, y).0[0] > threshold || b.get_pixel(x, y).0[0] > threshold {
            INCLUDED
        } else {
            EXCLUDED
        }
    })
}

/// Binarize a single mask with the merge rule.
///
/// Equivalent to merging `mask` with an empty mask.
#[must_use]
pub fn binarize(mask: &RgbaImage, threshold: u8, working: WorkingResolution) -> RgbaImage {
    let mask = working.apply(mask);
    RgbaImage::from_fn(working.side, working.side, |x, y| {
        if mask.get_pixel(x, y).0[0] > threshold {
            INCLUDED
        } else {
            EXCLUDED
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::count_foreground;
    use crate::resample::ResampleFilter;

    const WORKING: WorkingResolution = WorkingResolution::new(8, ResampleFilter::Nearest);

    fn left_half() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([200, 200, 200, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn top_half() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |_, y| {
            if y < 4 {
                Rgba([200, 200, 200, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn union_covers_both_regions() {
        let merged = merge_masks(&left_half(), &top_half(), 10, WORKING);
        assert_eq!(merged.get_pixel(1, 6).0, [255, 255, 255, 255]);
        assert_eq!(merged.get_pixel(6, 1).0, [255, 255, 255, 255]);
        assert_eq!(merged.get_pixel(6, 6).0, [0, 0, 0, 0]);
        // 64 pixels minus the bottom-right 4x4 quadrant.
        assert_eq!(count_foreground(&merged, 0), 48);
    }

    #[test]
    fn merging_with_self_equals_binarize() {
        #[allow(clippy::cast_possible_truncation)]
        let soft = RgbaImage::from_fn(8, 8, |x, y| {
            let v = ((x + y) * 4) as u8;
            Rgba([v, 0, 0, 255])
        });
        let merged = merge_masks(&soft, &soft, 10, WORKING);
        let single = binarize(&soft, 10, WORKING);
        assert_eq!(merged.as_raw(), single.as_raw());
    }

    #[test]
    fn output_is_strictly_binary() {
        #[allow(clippy::cast_possible_truncation)]
        let soft = RgbaImage::from_fn(8, 8, |x, _| Rgba([(x * 3) as u8, 0, 0, 128]));
        let merged = merge_masks(&soft, &left_half(), 10, WORKING);
        assert!(
            merged
                .pixels()
                .all(|p| p.0 == [255, 255, 255, 255] || p.0 == [0, 0, 0, 0])
        );
    }

    #[test]
    fn merge_threshold_is_permissive() {
        // Faint values the compositor would drop survive a merge.
        let faint = RgbaImage::from_pixel(8, 8, Rgba([30, 30, 30, 255]));
        let empty = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let merged = merge_masks(&faint, &empty, 10, WORKING);
        assert_eq!(count_foreground(&merged, 100), 64);
    }

    #[test]
    fn different_mask_sizes_are_registered() {
        let small = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let merged = merge_masks(&small, &left_half(), 10, WORKING);
        assert_eq!(merged.dimensions(), (8, 8));
        assert_eq!(count_foreground(&merged, 0), 64);
    }
}
