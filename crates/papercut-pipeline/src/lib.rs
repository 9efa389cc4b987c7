//! papercut-pipeline: turn a photo and its segmentation masks into a
//! stack of depth-ordered cutout panels (sans-IO).
//!
//! Data flows one way:
//!
//! segmentation result -> [`normalize`] -> [`LayerStore`] ->
//! [`SceneBuilder`] -> [`Scene`]
//!
//! The store is edited between builds by [`LayerStore::reorder`] and
//! [`LayerStore::merge`]; rebuilding is always an explicit call.
//!
//! This crate has **no I/O dependencies**. Remote mask references are
//! fetched through the [`MaskFetcher`] trait, implemented over HTTP and
//! the filesystem in `papercut-io`.

pub mod composite;
pub mod data_url;
pub mod decode;
pub mod diagnostics;
pub mod mask_ref;
pub mod merge;
pub mod normalize;
pub mod resample;
pub mod response;
pub mod scene;
pub mod session;
pub mod shadow;
pub mod store;
pub mod types;

pub use composite::{Cutout, PixelBounds, composite};
pub use diagnostics::{LayerOutcome, SceneDiagnostics};
pub use mask_ref::{MaskFetcher, MaskRef, MemoryFetcher, resolve_mask};
pub use merge::merge_masks;
pub use normalize::normalize;
pub use resample::{ResampleFilter, WorkingResolution};
pub use response::{SegmentationParts, SegmentationResponse};
pub use scene::{Panel, Scene, SceneBuilder, Shadow, SkipReason, SkippedLayer};
pub use session::Session;
pub use store::{Layer, LayerId, LayerStore, LayerSummary, Snapshot};
pub use types::{
    DepthOrder, Dimensions, Offset, PipelineError, RgbaImage, SceneConfig,
};
