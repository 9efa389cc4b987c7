//! The layer store: the ordered, mutable list of layers for one image.
//!
//! Order is meaningful. A layer's position is its depth rank, so every
//! mutation here changes the scene. Each change bumps a generation
//! counter; scenes record the generation they were built from so a
//! caller can tell when one has gone stale.
//!
//! Layer ids are never reused. A merge retires both input ids and gives
//! the combined layer a fresh one.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mask_ref::{MaskFetcher, MaskRef, resolve_mask};
use crate::merge::merge_masks;
use crate::normalize::normalize;
use crate::resample::WorkingResolution;
use crate::types::{PipelineError, SceneConfig};

/// Stable identity of a layer within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(u64);

impl LayerId {
    /// The raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One depth layer: an id and the mask that carves it out of the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    mask: MaskRef,
    merged: bool,
}

impl Layer {
    /// The layer's id.
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// The layer's mask reference.
    #[must_use]
    pub const fn mask(&self) -> &MaskRef {
        &self.mask
    }

    /// Whether this layer was produced by a merge.
    #[must_use]
    pub const fn is_merged(&self) -> bool {
        self.merged
    }
}

/// Listing entry for a layer, suitable for display or JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// The layer's id.
    pub id: LayerId,
    /// Position in the sequence (depth rank).
    pub position: usize,
    /// Human-readable description of the mask.
    pub mask: String,
    /// Whether the layer was produced by a merge.
    pub merged: bool,
}

/// Immutable view of the store at one generation.
///
/// Snapshots are cheap to clone and do not borrow the store, so a scene
/// build can run while the caller keeps editing.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    layers: Arc<[Layer]>,
}

impl Snapshot {
    /// Generation of the store when the snapshot was taken.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Layers in depth order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the snapshot has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// One [`LayerSummary`] per layer, in order.
    #[must_use]
    pub fn summaries(&self) -> Vec<LayerSummary> {
        self.layers
            .iter()
            .enumerate()
            .map(|(position, layer)| LayerSummary {
                id: layer.id,
                position,
                mask: layer.mask.to_string(),
                merged: layer.merged,
            })
            .collect()
    }

    /// Reference strings that reload these layers in the same order.
    ///
    /// Feeding the result to [`LayerStore::load`] reproduces the
    /// current masks, merged ones included. Merge flags and ids are not
    /// carried over.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageDecode`] if a merged raster cannot
    /// be encoded.
    pub fn references(&self) -> Result<Vec<String>, PipelineError> {
        self.layers.iter().map(|layer| layer.mask.to_reference()).collect()
    }
}

/// Ordered list of layers for the current source image.
#[derive(Debug, Clone, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
    next_id: u64,
    generation: u64,
}

impl LayerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with one layer per reference, in order.
    ///
    /// Every layer gets a fresh id; ids from earlier loads are retired.
    pub fn load<I>(&mut self, refs: I)
    where
        I: IntoIterator,
        I::Item: Into<MaskRef>,
    {
        let layers: Vec<Layer> = refs
            .into_iter()
            .map(|mask| Layer {
                id: self.allocate_id(),
                mask: mask.into(),
                merged: false,
            })
            .collect();
        self.layers = layers;
        self.bump();
        tracing::info!(
            layers = self.layers.len(),
            generation = self.generation,
            "loaded layers"
        );
    }

    /// Normalize a raw segmentation result and load it.
    ///
    /// Returns the number of layers loaded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptySegmentation`] if nothing resolves.
    /// The store is left untouched on error.
    pub fn load_segmentation(&mut self, raw: &Value) -> Result<usize, PipelineError> {
        let refs = normalize(raw)?;
        let count = refs.len();
        self.load(refs);
        Ok(count)
    }

    /// Remove every layer. Used when a new source image is submitted.
    pub fn reset(&mut self) {
        self.layers.clear();
        self.bump();
    }

    /// Move the layer at `from` to position `to`, shifting the layers
    /// between them by one. `from == to` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IndexOutOfRange`] if either index is not
    /// a valid position.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let layer = self.layers.remove(from);
        tracing::debug!(id = %layer.id, from, to, "reordering layer");
        self.layers.insert(to, layer);
        self.bump();
        Ok(())
    }

    /// Merge the layer at `source` into the layer at `target`.
    ///
    /// Both masks are resolved and unioned with the configured merge
    /// threshold. The combined layer takes `target`'s position with a
    /// fresh id, and `source` is removed, so the store shrinks by one.
    /// Layers that were neither input keep their relative order.
    ///
    /// Returns the id of the combined layer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IndexOutOfRange`] for an invalid index,
    /// [`PipelineError::InvalidMerge`] if `source == target`, or any
    /// mask resolution error. The store is unchanged on error.
    pub async fn merge<F: MaskFetcher>(
        &mut self,
        source: usize,
        target: usize,
        fetcher: &F,
        config: &SceneConfig,
    ) -> Result<LayerId, PipelineError> {
        self.check_index(source)?;
        self.check_index(target)?;
        if source == target {
            return Err(PipelineError::InvalidMerge { index: source });
        }

        let timeout = config.fetch_timeout;
        let (a, b) = futures::try_join!(
            resolve_mask(&self.layers[source].mask, fetcher, timeout),
            resolve_mask(&self.layers[target].mask, fetcher, timeout),
        )?;
        let union = merge_masks(
            &a,
            &b,
            config.merge_threshold,
            WorkingResolution::from(config),
        );

        let id = self.allocate_id();
        let retired = (self.layers[source].id, self.layers[target].id);
        self.layers[target] = Layer {
            id,
            mask: MaskRef::from(union),
            merged: true,
        };
        self.layers.remove(source);
        self.bump();

        tracing::info!(
            source = %retired.0,
            target = %retired.1,
            merged = %id,
            layers = self.layers.len(),
            "merged layers"
        );
        Ok(id)
    }

    /// Take an immutable view of the current layers.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            layers: self.layers.as_slice().into(),
        }
    }

    /// Layers in depth order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the store has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Position of the layer with `id`, if it is still present.
    #[must_use]
    pub fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }

    /// Current generation. Incremented by every mutation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether something built at `generation` still reflects the store.
    #[must_use]
    pub const fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(PipelineError::IndexOutOfRange {
                index,
                len: self.layers.len(),
            })
        }
    }

    fn allocate_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    const fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
