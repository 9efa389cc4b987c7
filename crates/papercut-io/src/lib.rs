//! papercut-io: the I/O edge of papercut.
//!
//! Fetches remote and on-disk masks for the pipeline, reads saved
//! segmentation responses and source images, and writes built scenes
//! out as PNG textures with a JSON manifest alongside the edited layer
//! list.

mod error;
pub mod export;
pub mod fetch;
pub mod load;

pub use error::IoError;
pub use export::{
    LAYERS_FILE, MANIFEST_FILE, PanelEntry, SceneManifest, export_scene, read_manifest,
    write_layers, write_png,
};
pub use fetch::HttpFetcher;
pub use load::{open_session, read_bytes, read_response};
