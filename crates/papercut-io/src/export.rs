//! Writing a built scene to disk.
//!
//! Each panel becomes two PNG files, its cutout and its shadow, and a
//! `scene.json` manifest records where every panel sits. The manifest
//! is enough to re-render the scene without the pipeline.
//!
//! The layer list itself can be saved as `layers.json`, a bare mask
//! payload with merged masks inlined, so an edited session can be
//! reopened later.

use std::fs;
use std::path::{Path, PathBuf};

use papercut_pipeline::decode::encode_png;
use papercut_pipeline::{
    Dimensions, LayerId, PixelBounds, RgbaImage, Scene, Shadow, SkippedLayer, Snapshot,
};
use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// File name of the manifest inside an export directory.
pub const MANIFEST_FILE: &str = "scene.json";

/// File name of the saved layer list inside an export directory.
pub const LAYERS_FILE: &str = "layers.json";

/// On-disk description of an exported scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    /// Store generation the scene was built from.
    pub generation: u64,
    /// Texture dimensions shared by every panel.
    pub dimensions: Dimensions,
    /// Panels in store order.
    pub panels: Vec<PanelEntry>,
    /// Layers without a panel.
    pub skipped: Vec<SkippedLayer>,
}

/// One exported panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelEntry {
    /// Layer the panel was built from.
    pub layer_id: LayerId,
    /// Store position of that layer.
    pub index: usize,
    /// Z position in world units.
    pub depth: f32,
    /// Side length of the quad in world units.
    pub extent: f32,
    /// Cutout texture file, relative to the manifest.
    pub texture: String,
    /// Shadow texture file, relative to the manifest.
    pub shadow_texture: String,
    /// Shadow placement.
    pub shadow: Shadow,
    /// Silhouette extent in texture pixels.
    pub bounds: PixelBounds,
    /// Opaque pixel count.
    pub foreground_pixels: u64,
}

/// Encode `image` as PNG and write it to `path`.
///
/// # Errors
///
/// Returns [`IoError::Pipeline`] if encoding fails and
/// [`IoError::File`] if the file cannot be written.
pub fn write_png(path: &Path, image: &RgbaImage) -> Result<(), IoError> {
    let png_bytes = encode_png(image)?;
    fs::write(path, png_bytes).map_err(|e| IoError::file(path, e))
}

/// Write every panel texture, shadow, and the manifest into `dir`.
///
/// The directory is created if needed. Existing files with the same
/// names are overwritten.
///
/// # Errors
///
/// Returns [`IoError::File`] on any filesystem failure and
/// [`IoError::Pipeline`] / [`IoError::Json`] on encoding failures.
pub fn export_scene(scene: &Scene, dir: &Path) -> Result<SceneManifest, IoError> {
    fs::create_dir_all(dir).map_err(|e| IoError::file(dir, e))?;

    let mut panels = Vec::with_capacity(scene.panels.len());
    for panel in &scene.panels {
        let texture = format!("panel_{:02}.png", panel.index);
        let shadow_texture = format!("shadow_{:02}.png", panel.index);
        write_png(&dir.join(&texture), &panel.cutout.texture)?;
        write_png(&dir.join(&shadow_texture), &panel.shadow_texture())?;

        panels.push(PanelEntry {
            layer_id: panel.layer_id,
            index: panel.index,
            depth: panel.depth,
            extent: panel.extent,
            texture,
            shadow_texture,
            shadow: panel.shadow,
            bounds: panel.cutout.bounds,
            foreground_pixels: panel.cutout.foreground_pixels,
        });
    }

    let manifest = SceneManifest {
        generation: scene.generation,
        dimensions: scene.dimensions,
        panels,
        skipped: scene.skipped.clone(),
    };
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&path, json).map_err(|e| IoError::file(&path, e))?;

    tracing::info!(
        dir = %dir.display(),
        panels = manifest.panels.len(),
        "exported scene"
    );
    Ok(manifest)
}

/// Save the layer list of `snapshot` as `layers.json` in `dir`.
///
/// The file is a JSON array of mask references in store order, which
/// [`read_response`](crate::read_response) accepts as a bare payload.
/// Returns the path written.
///
/// # Errors
///
/// Returns [`IoError::Pipeline`] if a merged mask cannot be encoded,
/// [`IoError::Json`] if serialization fails, and [`IoError::File`] on
/// filesystem failures.
pub fn write_layers(snapshot: &Snapshot, dir: &Path) -> Result<PathBuf, IoError> {
    fs::create_dir_all(dir).map_err(|e| IoError::file(dir, e))?;
    let refs = snapshot.references()?;
    let path = dir.join(LAYERS_FILE);
    let json = serde_json::to_string_pretty(&refs)?;
    fs::write(&path, json).map_err(|e| IoError::file(&path, e))?;
    tracing::debug!(path = %path.display(), layers = refs.len(), "saved layer list");
    Ok(path)
}

/// Read the manifest from an export directory.
///
/// # Errors
///
/// Returns [`IoError::File`] if it cannot be read and [`IoError::Json`]
/// if it does not parse.
pub fn read_manifest(dir: &Path) -> Result<SceneManifest, IoError> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = fs::read(&path).map_err(|e| IoError::file(&path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
