//! Scene build diagnostics: timing and per-layer outcomes.
//!
//! Every [`SceneBuilder::build_with_diagnostics`](crate::SceneBuilder::build_with_diagnostics)
//! call collects these alongside the scene. They exist for tuning
//! thresholds and spotting slow or broken mask references, and are
//! serializable so the bench CLI can emit them as JSON.
//!
//! Durations are serialized as fractional seconds (`f64`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::LayerId;
use crate::types::{Dimensions, duration_serde};

/// Diagnostics collected from a single scene build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDiagnostics {
    /// Store generation the scene was built from.
    pub generation: u64,
    /// Working resolution every layer was composited at.
    pub working: Dimensions,
    /// Time spent resampling the source image.
    #[serde(with = "duration_serde")]
    pub resample_duration: Duration,
    /// One entry per layer, in depth order.
    pub layers: Vec<LayerDiagnostics>,
    /// Wall-clock duration of the whole build.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Counts across all layers.
    pub summary: SceneSummary,
}

/// What happened to one layer during a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDiagnostics {
    /// The layer's id.
    pub layer_id: LayerId,
    /// Position in the store.
    pub index: usize,
    /// Time from the start of mask resolution to the finished cutout.
    /// Layers run concurrently, so these overlap.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Panel, empty, or failed.
    pub outcome: LayerOutcome,
}

/// Outcome of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerOutcome {
    /// A panel was emitted.
    Panel {
        /// Z position of the panel.
        depth: f32,
        /// Opaque pixel count of the cutout.
        foreground_pixels: u64,
        /// Opaque fraction of the cutout.
        coverage: f64,
    },
    /// The mask had no foreground pixels at the cutout threshold.
    Empty,
    /// The mask could not be resolved or decoded.
    Failed {
        /// Error message.
        reason: String,
    },
}

/// Counts across all layers of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneSummary {
    /// Layers in the snapshot.
    pub layer_count: usize,
    /// Panels emitted.
    pub panel_count: usize,
    /// Layers skipped as empty.
    pub empty_count: usize,
    /// Layers skipped after an error.
    pub failed_count: usize,
}

impl SceneSummary {
    /// Tally outcomes.
    #[must_use]
    pub fn from_layers(layers: &[LayerDiagnostics]) -> Self {
        layers.iter().fold(
            Self {
                layer_count: layers.len(),
                ..Self::default()
            },
            |mut summary, layer| {
                match layer.outcome {
                    LayerOutcome::Panel { .. } => summary.panel_count += 1,
                    LayerOutcome::Empty => summary.empty_count += 1,
                    LayerOutcome::Failed { .. } => summary.failed_count += 1,
                }
                summary
            },
        )
    }
}

impl SceneDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Scene Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Generation {}  |  Working resolution: {}x{}",
            self.generation, self.working.width, self.working.height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms  (resample {:.3}ms)",
            duration_ms(self.total_duration),
            duration_ms(self.resample_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<6} {:<8} {:>10}  {}",
            "Index", "Layer", "Duration", "Outcome"
        ));
        lines.push("-".repeat(80));

        for layer in &self.layers {
            let ms = duration_ms(layer.duration);
            lines.push(format!(
                "{:<6} {:<8} {ms:>8.3}ms  {}",
                layer.index,
                layer.layer_id.to_string(),
                format_outcome(&layer.outcome),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Layers: {}  |  Panels: {}  |  Empty: {}  |  Failed: {}",
            self.summary.layer_count,
            self.summary.panel_count,
            self.summary.empty_count,
            self.summary.failed_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_outcome(outcome: &LayerOutcome) -> String {
    match outcome {
        LayerOutcome::Panel {
            depth,
            foreground_pixels,
            coverage,
        } => format!(
            "panel z={depth:.2} px={foreground_pixels} ({:.1}%)",
            coverage * 100.0
        ),
        LayerOutcome::Empty => "skipped: empty".to_string(),
        LayerOutcome::Failed { reason } => format!("skipped: {reason}"),
    }
}
