//! Scene assembly: one depth-stacked panel per layer.
//!
//! The builder composites every layer in a [`Snapshot`] against the
//! source image and places the resulting cutouts along the Z axis by
//! store position. Layers run concurrently; results are stamped with
//! their index and re-sorted, so panel order never depends on which
//! fetch finished first.
//!
//! A build never fails as a whole. Empty masks and layers whose mask
//! could not be resolved are recorded in [`Scene::skipped`]; callers
//! that need at least one panel use [`Scene::ensure_visible`].

use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};

use crate::composite::{Cutout, composite};
use crate::diagnostics::{LayerDiagnostics, LayerOutcome, SceneDiagnostics, SceneSummary};
use crate::mask_ref::{MaskFetcher, resolve_mask};
use crate::resample::WorkingResolution;
use crate::shadow::silhouette;
use crate::store::{Layer, LayerId, Snapshot};
use crate::types::{Dimensions, Offset, PipelineError, RgbaImage, SceneConfig};

/// Drop-shadow placement for a panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    /// Z position of the shadow quad, just behind its panel.
    pub depth: f32,
    /// In-plane displacement from the panel.
    pub shift: Offset,
    /// Opacity of the silhouette.
    pub opacity: f32,
    /// Blur sigma in pixels.
    pub softness: f32,
}

/// One textured quad in the scene.
#[derive(Debug, Clone)]
pub struct Panel {
    /// Layer the panel was built from.
    pub layer_id: LayerId,
    /// Store position of that layer.
    pub index: usize,
    /// Z position in world units.
    pub depth: f32,
    /// Side length of the square quad in world units.
    pub extent: f32,
    /// The composited texture.
    pub cutout: Cutout,
    /// Shadow placement.
    pub shadow: Shadow,
}

impl Panel {
    /// The shadow texture: the cutout's silhouette in black.
    #[must_use]
    pub fn shadow_texture(&self) -> RgbaImage {
        silhouette(&self.cutout.texture, self.shadow.opacity, self.shadow.softness)
    }

    /// Corners of the panel quad, counter-clockwise from bottom-left,
    /// centred on the Z axis.
    #[must_use]
    pub fn corners(&self) -> [[f32; 3]; 4] {
        quad(self.extent, 0.0, 0.0, self.depth)
    }

    /// Corners of the shadow quad.
    #[must_use]
    pub fn shadow_corners(&self) -> [[f32; 3]; 4] {
        quad(
            self.extent,
            self.shadow.shift.x,
            self.shadow.shift.y,
            self.shadow.depth,
        )
    }
}

fn quad(extent: f32, cx: f32, cy: f32, z: f32) -> [[f32; 3]; 4] {
    let h = extent / 2.0;
    [
        [cx - h, cy - h, z],
        [cx + h, cy - h, z],
        [cx + h, cy + h, z],
        [cx - h, cy + h, z],
    ]
}

/// Why a layer produced no panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The mask had no foreground pixels.
    Empty,
    /// The mask could not be resolved or decoded.
    Failed(String),
}

/// A layer that was left out of the scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLayer {
    /// The layer's id.
    pub layer_id: LayerId,
    /// Store position of the layer.
    pub index: usize,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A built scene.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Store generation the scene reflects.
    pub generation: u64,
    /// Texture dimensions shared by every panel.
    pub dimensions: Dimensions,
    /// Panels in store order.
    pub panels: Vec<Panel>,
    /// Layers without a panel, in store order.
    pub skipped: Vec<SkippedLayer>,
}

impl Scene {
    /// Whether the scene has no panels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Number of layers skipped because their masks failed to resolve.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Failed(_)))
            .count()
    }

    /// Return the scene if it has at least one panel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoVisibleLayers`] if every layer was
    /// skipped.
    pub fn ensure_visible(self) -> Result<Self, PipelineError> {
        if self.panels.is_empty() {
            Err(PipelineError::NoVisibleLayers {
                skipped: self.skipped.len(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Builds scenes from store snapshots.
#[derive(Debug, Clone, Default)]
pub struct SceneBuilder {
    config: SceneConfig,
}

impl SceneBuilder {
    /// Create a builder with the given configuration.
    #[must_use]
    pub const fn new(config: SceneConfig) -> Self {
        Self { config }
    }

    /// The builder's configuration.
    #[must_use]
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Build a scene from `snapshot`, cutting each layer out of `source`.
    ///
    /// Building the same snapshot twice with the same inputs yields the
    /// same panels.
    pub async fn build<F: MaskFetcher>(
        &self,
        snapshot: &Snapshot,
        source: &RgbaImage,
        fetcher: &F,
    ) -> Scene {
        self.build_with_diagnostics(snapshot, source, fetcher)
            .await
            .0
    }

    /// [`build`](Self::build), also returning timing and per-layer
    /// outcomes.
    pub async fn build_with_diagnostics<F: MaskFetcher>(
        &self,
        snapshot: &Snapshot,
        source: &RgbaImage,
        fetcher: &F,
    ) -> (Scene, SceneDiagnostics) {
        let start = Instant::now();
        let working = WorkingResolution::from(&self.config);

        let t = Instant::now();
        let source = working.apply(source);
        let resample_duration = t.elapsed();
        let source: &RgbaImage = &source;

        let mut pending: FuturesUnordered<_> = snapshot
            .layers()
            .iter()
            .enumerate()
            .map(|(index, layer)| async move {
                let started = Instant::now();
                let result = self.cut(layer, source, fetcher).await;
                (index, result, started.elapsed())
            })
            .collect();

        let mut outcomes = Vec::with_capacity(snapshot.len());
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }
        outcomes.sort_unstable_by_key(|(index, ..)| *index);

        let mut panels = Vec::new();
        let mut skipped = Vec::new();
        let mut layers = Vec::with_capacity(outcomes.len());

        for (layer, (index, result, duration)) in snapshot.layers().iter().zip(outcomes) {
            let layer_id = layer.id();
            let outcome = match result {
                Ok(cutout) => {
                    let panel = self.panel(layer_id, index, cutout);
                    let outcome = LayerOutcome::Panel {
                        depth: panel.depth,
                        foreground_pixels: panel.cutout.foreground_pixels,
                        coverage: panel.cutout.coverage(),
                    };
                    panels.push(panel);
                    outcome
                }
                Err(PipelineError::EmptyLayer) => {
                    tracing::debug!(layer = %layer_id, index, "skipping empty layer");
                    skipped.push(SkippedLayer {
                        layer_id,
                        index,
                        reason: SkipReason::Empty,
                    });
                    LayerOutcome::Empty
                }
                Err(err) => {
                    tracing::warn!(layer = %layer_id, index, %err, "skipping layer");
                    let reason = err.to_string();
                    skipped.push(SkippedLayer {
                        layer_id,
                        index,
                        reason: SkipReason::Failed(reason.clone()),
                    });
                    LayerOutcome::Failed { reason }
                }
            };
            layers.push(LayerDiagnostics {
                layer_id,
                index,
                duration,
                outcome,
            });
        }

        let scene = Scene {
            generation: snapshot.generation(),
            dimensions: self.config.working_dimensions(),
            panels,
            skipped,
        };
        let diagnostics = SceneDiagnostics {
            generation: scene.generation,
            working: scene.dimensions,
            resample_duration,
            summary: SceneSummary::from_layers(&layers),
            layers,
            total_duration: start.elapsed(),
        };

        tracing::info!(
            generation = scene.generation,
            panels = diagnostics.summary.panel_count,
            empty = diagnostics.summary.empty_count,
            failed = diagnostics.summary.failed_count,
            elapsed_ms = millis(diagnostics.total_duration),
            "built scene"
        );
        (scene, diagnostics)
    }

    async fn cut<F: MaskFetcher>(
        &self,
        layer: &Layer,
        source: &RgbaImage,
        fetcher: &F,
    ) -> Result<Cutout, PipelineError> {
        let mask = resolve_mask(layer.mask(), fetcher, self.config.fetch_timeout).await?;
        composite(
            source,
            &mask,
            self.config.cutout_threshold,
            WorkingResolution::from(&self.config),
        )
    }

    fn panel(&self, layer_id: LayerId, index: usize, cutout: Cutout) -> Panel {
        let depth = self.config.depth_for(index);
        Panel {
            layer_id,
            index,
            depth,
            extent: self.config.panel_extent,
            cutout,
            shadow: Shadow {
                depth: depth - self.config.shadow_offset,
                shift: self.config.shadow_shift,
                opacity: self.config.shadow_opacity,
                softness: self.config.shadow_softness,
            },
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;
    use std::time::Duration;

    use image::Rgba;

    use super::*;
    use crate::data_url::encode_png_data_url;
    use crate::decode::encode_png;
    use crate::mask_ref::MemoryFetcher;
    use crate::resample::ResampleFilter;
    use crate::store::LayerStore;
    use crate::types::DepthOrder;

    fn config() -> SceneConfig {
        SceneConfig {
            working_resolution: 8,
            resample_filter: ResampleFilter::Nearest,
            ..SceneConfig::default()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn source() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 20, y as u8 * 20, 99, 255]))
    }

    /// 8x8 mask with the given rows set.
    fn rows(range: std::ops::Range<u32>) -> RgbaImage {
        RgbaImage::from_fn(8, 8, |_, y| {
            if range.contains(&y) {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn store_of(masks: &[RgbaImage]) -> LayerStore {
        let mut store = LayerStore::new();
        store.load(masks.iter().map(|m| encode_png_data_url(m).unwrap()));
        store
    }

    #[tokio::test]
    async fn empty_middle_layer_is_skipped_without_shifting_depths() {
        let store = store_of(&[rows(0..2), rows(0..0), rows(4..8)]);
        let builder = SceneBuilder::new(config());
        let scene = builder
            .build(&store.snapshot(), &source(), &MemoryFetcher::new())
            .await;

        assert_eq!(scene.panels.len(), 2);
        assert!(scene.panels[0].depth.abs() < 1e-6);
        assert!((scene.panels[1].depth - 0.6).abs() < 1e-6);
        assert_eq!(scene.panels[1].index, 2);
        assert_eq!(scene.skipped.len(), 1);
        assert_eq!(scene.skipped[0].index, 1);
        assert_eq!(scene.skipped[0].reason, SkipReason::Empty);
        assert_eq!(scene.failed_count(), 0);
        assert_eq!(scene.dimensions, Dimensions::square(8));
    }

    #[tokio::test]
    async fn shadows_sit_behind_their_panels() {
        let store = store_of(&[rows(0..4), rows(4..8)]);
        let scene = SceneBuilder::new(config())
            .build(&store.snapshot(), &source(), &MemoryFetcher::new())
            .await;
        for panel in &scene.panels {
            assert!((panel.depth - panel.shadow.depth - 0.05).abs() < 1e-6);
            assert!(panel.shadow.depth < panel.depth);
            let shadow = panel.shadow_texture();
            assert_eq!(shadow.dimensions(), (8, 8));
        }
        let top = &scene.panels[0];
        assert_eq!(top.shadow_texture().get_pixel(0, 0).0, [0, 0, 0, 77]);
        assert_eq!(top.shadow_texture().get_pixel(0, 7).0, [0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn first_is_front_recedes() {
        let store = store_of(&[rows(0..4), rows(4..8)]);
        let config = SceneConfig {
            depth_order: DepthOrder::FirstIsFront,
            ..config()
        };
        let scene = SceneBuilder::new(config)
            .build(&store.snapshot(), &source(), &MemoryFetcher::new())
            .await;
        assert!(scene.panels[1].depth < scene.panels[0].depth);
        assert!((scene.panels[1].depth + 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn build_is_idempotent() {
        let store = store_of(&[rows(0..3), rows(2..6), rows(5..8)]);
        let builder = SceneBuilder::new(config());
        let snapshot = store.snapshot();
        let a = builder.build(&snapshot, &source(), &MemoryFetcher::new()).await;
        let b = builder.build(&snapshot, &source(), &MemoryFetcher::new()).await;

        assert_eq!(a.panels.len(), b.panels.len());
        for (pa, pb) in a.panels.iter().zip(&b.panels) {
            assert_eq!(pa.layer_id, pb.layer_id);
            assert_eq!(pa.cutout.texture.as_raw(), pb.cutout.texture.as_raw());
            assert!((pa.depth - pb.depth).abs() < f32::EPSILON);
        }
    }

    /// Serves each reference after a delay inversely proportional to its
    /// position, so later layers finish first.
    struct Staggered {
        inner: MemoryFetcher,
        delays: Vec<(String, Duration)>,
    }

    impl MaskFetcher for Staggered {
        fn fetch(&self, reference: &str) -> impl Future<Output = Result<Vec<u8>, PipelineError>> {
            let delay = self
                .delays
                .iter()
                .find(|(r, _)| r == reference)
                .map_or(Duration::ZERO, |(_, d)| *d);
            async move {
                tokio::time::sleep(delay).await;
                self.inner.fetch(reference).await
            }
        }
    }

    #[tokio::test]
    async fn panel_order_follows_store_not_completion() {
        let names = ["slow", "medium", "fast"];
        let masks = [rows(0..2), rows(2..4), rows(4..6)];
        let mut inner = MemoryFetcher::new();
        for (name, mask) in names.iter().zip(&masks) {
            inner.insert(*name, encode_png(mask).unwrap());
        }
        let fetcher = Staggered {
            inner,
            delays: vec![
                ("slow".to_string(), Duration::from_millis(60)),
                ("medium".to_string(), Duration::from_millis(30)),
                ("fast".to_string(), Duration::ZERO),
            ],
        };

        let mut store = LayerStore::new();
        store.load(names);
        let snapshot = store.snapshot();
        let scene = SceneBuilder::new(config())
            .build(&snapshot, &source(), &fetcher)
            .await;

        let ids: Vec<_> = scene.panels.iter().map(|p| p.layer_id).collect();
        let expected: Vec<_> = snapshot.layers().iter().map(Layer::id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn unresolvable_layer_is_failed_not_fatal() {
        let mut store = LayerStore::new();
        store.load([encode_png_data_url(&rows(0..4)).unwrap(), "missing".to_string()]);
        let (scene, diagnostics) = SceneBuilder::new(config())
            .build_with_diagnostics(&store.snapshot(), &source(), &MemoryFetcher::new())
            .await;

        assert_eq!(scene.panels.len(), 1);
        assert_eq!(scene.failed_count(), 1);
        assert!(matches!(scene.skipped[0].reason, SkipReason::Failed(ref msg) if msg.contains("missing")));
        assert_eq!(diagnostics.summary.panel_count, 1);
        assert_eq!(diagnostics.summary.failed_count, 1);
        assert_eq!(diagnostics.layers.len(), 2);
    }

    /// Never answers.
    struct Stalled;

    impl MaskFetcher for Stalled {
        async fn fetch(&self, _reference: &str) -> Result<Vec<u8>, PipelineError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_fetch_fails_its_layer_only() {
        let mut store = LayerStore::new();
        store.load([
            encode_png_data_url(&rows(0..2)).unwrap(),
            "slow".to_string(),
            encode_png_data_url(&rows(4..8)).unwrap(),
        ]);
        let builder = SceneBuilder::new(SceneConfig {
            fetch_timeout: Duration::from_millis(20),
            ..config()
        });

        let scene = tokio::time::timeout(
            Duration::from_secs(5),
            builder.build(&store.snapshot(), &source(), &Stalled),
        )
        .await
        .unwrap();

        let indices: Vec<_> = scene.panels.iter().map(|p| p.index).collect();
        assert_eq!(indices, [0, 2]);
        assert_eq!(scene.skipped.len(), 1);
        assert_eq!(scene.skipped[0].index, 1);
        assert!(matches!(
            scene.skipped[0].reason,
            SkipReason::Failed(ref msg) if msg.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn all_empty_scene_is_not_visible() {
        let store = store_of(&[rows(0..0), rows(0..0)]);
        let scene = SceneBuilder::new(config())
            .build(&store.snapshot(), &source(), &MemoryFetcher::new())
            .await;
        assert!(scene.is_empty());
        assert!(matches!(
            scene.ensure_visible(),
            Err(PipelineError::NoVisibleLayers { skipped: 2 })
        ));
    }

    #[tokio::test]
    async fn scene_records_snapshot_generation() {
        let mut store = store_of(&[rows(0..4), rows(4..8)]);
        let snapshot = store.snapshot();
        let scene = SceneBuilder::new(config())
            .build(&snapshot, &source(), &MemoryFetcher::new())
            .await;
        assert!(store.is_current(scene.generation));
        store.reorder(0, 1).unwrap();
        assert!(!store.is_current(scene.generation));
    }

    #[test]
    fn corners_are_centred_at_depth() {
        let cutout = Cutout {
            texture: rows(0..1),
            foreground_pixels: 8,
            bounds: crate::composite::PixelBounds {
                min_x: 0,
                min_y: 0,
                max_x: 7,
                max_y: 0,
            },
        };
        let panel = SceneBuilder::new(config()).panel(serde_json::from_str("1").unwrap(), 2, cutout);
        assert_eq!(panel.corners()[0], [-2.0, -2.0, panel.depth]);
        assert_eq!(panel.corners()[2], [2.0, 2.0, panel.depth]);
        let shadow = panel.shadow_corners();
        assert!((shadow[0][0] - (-1.95)).abs() < 1e-6);
        assert!((shadow[0][1] - (-2.05)).abs() < 1e-6);
        assert!((shadow[0][2] - panel.shadow.depth).abs() < f32::EPSILON);
    }
}
