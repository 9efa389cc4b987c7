//! Shared types for the papercut layering pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resample::ResampleFilter;
use crate::shadow::max_softness;

/// Re-export `RgbaImage` so downstream crates can hold source images,
/// masks, and cutout textures without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Square dimensions with the given side length.
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Which end of the layer sequence sits closest to the camera.
///
/// The camera looks down the negative Z axis from positive Z, so larger
/// depth values are nearer to the viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthOrder {
    /// Index 0 is the rearmost panel; depth grows with the index.
    #[default]
    FirstIsBack,
    /// Index 0 is the frontmost panel; later indices recede.
    FirstIsFront,
}

/// A 2D offset in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal offset (positive is right).
    pub x: f32,
    /// Vertical offset (positive is up).
    pub y: f32,
}

impl Offset {
    /// Create a new offset.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Configuration for compositing, merging, and scene assembly.
///
/// The Compositor and the Merge Engine use deliberately different
/// thresholds: merging favours inclusion so the union of two masks keeps
/// faint edges, while compositing trims anti-aliased fringes.
///
/// Fields are public; call [`validate`](Self::validate) before use when
/// the values come from user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Side length of the square raster every source image and mask is
    /// resampled to before any per-pixel work.
    pub working_resolution: u32,

    /// Resampling filter shared by source images and masks, so the two
    /// stay registered.
    pub resample_filter: ResampleFilter,

    /// A mask pixel is cutout foreground when its red channel exceeds
    /// this value.
    pub cutout_threshold: u8,

    /// A mask pixel joins a merge union when its red channel exceeds
    /// this value.
    pub merge_threshold: u8,

    /// World-unit Z spacing between consecutive layers.
    pub depth_step: f32,

    /// Which end of the layer sequence is nearest the camera.
    pub depth_order: DepthOrder,

    /// How far behind its panel the drop shadow sits.
    pub shadow_offset: f32,

    /// Opacity of the drop shadow, from 0.0 (invisible) to 1.0.
    pub shadow_opacity: f32,

    /// In-plane displacement of the drop shadow.
    pub shadow_shift: Offset,

    /// Gaussian sigma in pixels used to soften the shadow silhouette.
    /// Zero keeps a hard edge.
    pub shadow_softness: f32,

    /// Side length of every panel in world units.
    pub panel_extent: f32,

    /// Upper bound on a single mask fetch before the layer is counted
    /// as failed.
    #[serde(with = "duration_serde")]
    pub fetch_timeout: Duration,
}

impl SceneConfig {
    /// Default working resolution in pixels.
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 512;
    /// Default resampling filter.
    pub const DEFAULT_RESAMPLE_FILTER: ResampleFilter = ResampleFilter::Triangle;
    /// Default compositor foreground threshold.
    pub const DEFAULT_CUTOUT_THRESHOLD: u8 = 100;
    /// Default merge inclusion threshold.
    pub const DEFAULT_MERGE_THRESHOLD: u8 = 10;
    /// Default Z spacing between layers.
    pub const DEFAULT_DEPTH_STEP: f32 = 0.3;
    /// Default shadow distance behind its panel.
    pub const DEFAULT_SHADOW_OFFSET: f32 = 0.05;
    /// Default shadow opacity.
    pub const DEFAULT_SHADOW_OPACITY: f32 = 0.3;
    /// Default shadow in-plane displacement.
    pub const DEFAULT_SHADOW_SHIFT: Offset = Offset::new(0.05, -0.05);
    /// Default shadow softness (hard edge).
    pub const DEFAULT_SHADOW_SOFTNESS: f32 = 0.0;
    /// Default panel side length in world units.
    pub const DEFAULT_PANEL_EXTENT: f32 = 4.0;
    /// Default per-mask fetch bound.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
    /// Largest accepted working resolution. Every layer holds a few
    /// rasters of this side, so it bounds per-build memory.
    pub const MAX_WORKING_RESOLUTION: u32 = 4096;

    /// Z position of the panel for the layer at `index`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn depth_for(&self, index: usize) -> f32 {
        let magnitude = index as f32 * self.depth_step;
        match self.depth_order {
            DepthOrder::FirstIsBack => magnitude,
            DepthOrder::FirstIsFront => -magnitude,
        }
    }

    /// Working-resolution dimensions.
    #[must_use]
    pub const fn working_dimensions(&self) -> Dimensions {
        Dimensions::square(self.working_resolution)
    }

    /// Check the configuration for values that cannot produce a scene.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.working_resolution == 0 || self.working_resolution > Self::MAX_WORKING_RESOLUTION {
            return Err(PipelineError::InvalidConfig(format!(
                "working_resolution must be within 1..={}, got {}",
                Self::MAX_WORKING_RESOLUTION,
                self.working_resolution,
            )));
        }
        if !self.depth_step.is_finite() || self.depth_step < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "depth_step must be finite and non-negative, got {}",
                self.depth_step,
            )));
        }
        if !self.shadow_offset.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "shadow_offset must be finite, got {}",
                self.shadow_offset,
            )));
        }
        if !(0.0..=1.0).contains(&self.shadow_opacity) {
            return Err(PipelineError::InvalidConfig(format!(
                "shadow_opacity must be within 0.0..=1.0, got {}",
                self.shadow_opacity,
            )));
        }
        if !self.shadow_softness.is_finite() || self.shadow_softness < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "shadow_softness must be finite and non-negative, got {}",
                self.shadow_softness,
            )));
        }
        let max_softness = max_softness(self.working_resolution);
        if self.shadow_softness > max_softness {
            return Err(PipelineError::InvalidConfig(format!(
                "shadow_softness must be at most {max_softness} at working_resolution {}, got {}",
                self.working_resolution, self.shadow_softness,
            )));
        }
        if !self.panel_extent.is_finite() || self.panel_extent <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "panel_extent must be finite and positive, got {}",
                self.panel_extent,
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "fetch_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            resample_filter: Self::DEFAULT_RESAMPLE_FILTER,
            cutout_threshold: Self::DEFAULT_CUTOUT_THRESHOLD,
            merge_threshold: Self::DEFAULT_MERGE_THRESHOLD,
            depth_step: Self::DEFAULT_DEPTH_STEP,
            depth_order: DepthOrder::default(),
            shadow_offset: Self::DEFAULT_SHADOW_OFFSET,
            shadow_opacity: Self::DEFAULT_SHADOW_OPACITY,
            shadow_shift: Self::DEFAULT_SHADOW_SHIFT,
            shadow_softness: Self::DEFAULT_SHADOW_SOFTNESS,
            panel_extent: Self::DEFAULT_PANEL_EXTENT,
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Errors that can occur while normalizing, compositing, mutating the
/// layer store, or assembling a scene.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The segmentation result contained no usable mask data.
    #[error("no layers detected in the segmentation result")]
    EmptySegmentation,

    /// One element of the segmentation result carried no mask reference.
    #[error("segmentation element {index} has no usable mask reference")]
    UnresolvableMaskReference {
        /// Position of the element in the segmentation result.
        index: usize,
    },

    /// A mask composited to zero foreground pixels.
    #[error("mask has no foreground pixels")]
    EmptyLayer,

    /// A layer store operation named a position outside the sequence.
    #[error("layer index {index} is out of range for {len} layers")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The sequence length at the time of the call.
        len: usize,
    },

    /// A layer cannot be merged with itself.
    #[error("cannot merge layer {index} with itself")]
    InvalidMerge {
        /// The index given as both source and target.
        index: usize,
    },

    /// Failed to decode image bytes.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Image bytes were empty.
    #[error("image data is empty")]
    EmptyInput,

    /// A `data:` URL or base64 payload was malformed.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// Fetching a remote mask failed.
    #[error("failed to fetch {reference}: {message}")]
    Fetch {
        /// The mask reference that was being fetched.
        reference: String,
        /// Description of the failure.
        message: String,
    },

    /// Fetching a remote mask exceeded the configured bound.
    #[error("fetching {reference} timed out after {timeout:?}")]
    FetchTimeout {
        /// The mask reference that was being fetched.
        reference: String,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The segmentation service reported a failure.
    #[error("segmentation failed: {0}")]
    SegmentationFailed(String),

    /// Scene configuration is invalid.
    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),

    /// Every layer was skipped while building a scene.
    #[error("no visible layers ({skipped} skipped)")]
    NoVisibleLayers {
        /// Number of layers that were skipped.
        skipped: usize,
    },
}
