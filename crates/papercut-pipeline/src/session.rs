//! One image's worth of editing state.
//!
//! A [`Session`] owns the decoded source image, its [`LayerStore`], and
//! the [`SceneBuilder`] configuration. It is what a UI holds between
//! gestures: list the layers, apply merges and reorders, and call
//! [`build`](Session::build) when the user asks for a fresh scene.
//! Submitting a new image replaces everything at once.

use serde_json::Value;

use crate::decode::decode_rgba;
use crate::diagnostics::SceneDiagnostics;
use crate::mask_ref::MaskFetcher;
use crate::normalize::normalize;
use crate::response::SegmentationResponse;
use crate::scene::{Scene, SceneBuilder};
use crate::store::{LayerId, LayerStore, Snapshot};
use crate::types::{PipelineError, RgbaImage, SceneConfig};

/// Editing state for one source image.
#[derive(Debug, Clone)]
pub struct Session {
    builder: SceneBuilder,
    source: RgbaImage,
    store: LayerStore,
}

impl Session {
    /// Start a session from raw image bytes and a raw segmentation
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation, an image error if `image_bytes` do not decode, and
    /// [`PipelineError::EmptySegmentation`] if no mask resolves.
    pub fn new(
        config: SceneConfig,
        image_bytes: &[u8],
        masks: &Value,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let mut session = Self {
            builder: SceneBuilder::new(config),
            source: RgbaImage::new(0, 0),
            store: LayerStore::new(),
        };
        session.submit(image_bytes, masks)?;
        Ok(session)
    }

    /// Start a session from a segmentation response envelope.
    ///
    /// The source image comes from `image_bytes` when given, otherwise
    /// from the envelope's `originalImage`.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new), plus [`PipelineError::SegmentationFailed`]
    /// for a failed response and [`PipelineError::EmptyInput`] when no
    /// source image is available.
    pub fn from_response(
        config: SceneConfig,
        response: SegmentationResponse,
        image_bytes: Option<&[u8]>,
    ) -> Result<Self, PipelineError> {
        let parts = response.into_parts()?;
        let bytes = match (image_bytes, parts.source_image.as_deref()) {
            (Some(bytes), _) | (None, Some(bytes)) => bytes,
            (None, None) => return Err(PipelineError::EmptyInput),
        };
        Self::new(config, bytes, &parts.masks)
    }

    /// Replace the source image and its layers.
    ///
    /// Nothing changes unless both the image and the masks are usable.
    /// Returns the number of layers loaded.
    ///
    /// # Errors
    ///
    /// Returns an image error if `image_bytes` do not decode, and
    /// [`PipelineError::EmptySegmentation`] if no mask resolves.
    pub fn submit(&mut self, image_bytes: &[u8], masks: &Value) -> Result<usize, PipelineError> {
        let source = decode_rgba(image_bytes)?;
        let refs = normalize(masks)?;
        let count = refs.len();

        tracing::info!(
            width = source.width(),
            height = source.height(),
            layers = count,
            "submitted image"
        );
        self.source = source;
        self.store.load(refs);
        Ok(count)
    }

    /// Scene configuration.
    #[must_use]
    pub const fn config(&self) -> &SceneConfig {
        self.builder.config()
    }

    /// The decoded source image at its original size.
    #[must_use]
    pub const fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// The layer store.
    #[must_use]
    pub const fn store(&self) -> &LayerStore {
        &self.store
    }

    /// Snapshot of the current layers.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Move a layer. See [`LayerStore::reorder`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IndexOutOfRange`] for an invalid index.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.store.reorder(from, to)
    }

    /// Merge two layers. See [`LayerStore::merge`].
    ///
    /// # Errors
    ///
    /// As [`LayerStore::merge`].
    pub async fn merge<F: MaskFetcher>(
        &mut self,
        source: usize,
        target: usize,
        fetcher: &F,
    ) -> Result<LayerId, PipelineError> {
        self.store
            .merge(source, target, fetcher, self.builder.config())
            .await
    }

    /// Build a scene from the current layers.
    pub async fn build<F: MaskFetcher>(&self, fetcher: &F) -> Scene {
        self.builder
            .build(&self.store.snapshot(), &self.source, fetcher)
            .await
    }

    /// Build a scene and collect diagnostics.
    pub async fn build_with_diagnostics<F: MaskFetcher>(
        &self,
        fetcher: &F,
    ) -> (Scene, SceneDiagnostics) {
        self.builder
            .build_with_diagnostics(&self.store.snapshot(), &self.source, fetcher)
            .await
    }

    /// Whether `scene` still reflects the current layers.
    #[must_use]
    pub const fn is_current(&self, scene: &Scene) -> bool {
        self.store.is_current(scene.generation)
    }
}
