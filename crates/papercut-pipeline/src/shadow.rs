//! Drop-shadow silhouettes.
//!
//! A shadow reuses its panel's cutout as a stencil: every opaque texel
//! becomes black at the shadow opacity. With a positive softness the
//! alpha channel is run through [`imageproc::filter::gaussian_blur_f32`]
//! so the edge feathers out.

use image::{GrayImage, Luma, Rgba};

use crate::types::RgbaImage;

/// Build the shadow texture for `texture`.
///
/// `opacity` is clamped to `0.0..=1.0`. Non-positive `softness` keeps a
/// hard edge, since `imageproc` panics on `sigma <= 0.0`. Softness above
/// [`max_softness`] of the longer side is clamped; the blur kernel grows
/// with sigma and would otherwise exhaust memory.
#[must_use = "returns the shadow texture"]
pub fn silhouette(texture: &RgbaImage, opacity: f32, softness: f32) -> RgbaImage {
    let alpha = shadow_alpha(opacity);
    let (w, h) = texture.dimensions();

    let stencil = GrayImage::from_fn(w, h, |x, y| {
        if texture.get_pixel(x, y).0[3] > 0 {
            Luma([alpha])
        } else {
            Luma([0])
        }
    });

    let stencil = if softness > 0.0 {
        let sigma = softness.min(max_softness(w.max(h)));
        imageproc::filter::gaussian_blur_f32(&stencil, sigma)
    } else {
        stencil
    };

    RgbaImage::from_fn(w, h, |x, y| Rgba([0, 0, 0, stencil.get_pixel(x, y).0[0]]))
}

/// Largest useful blur sigma for a texture of `side` pixels.
///
/// Beyond a quarter of the side the silhouette is already spread across
/// the whole texture.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn max_softness(side: u32) -> f32 {
    side as f32 / 4.0
}

/// Shadow opacity as an 8-bit alpha value.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn shadow_alpha(opacity: f32) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}
