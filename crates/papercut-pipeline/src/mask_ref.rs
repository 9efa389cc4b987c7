//! Mask references and their resolution to pixel data.
//!
//! A layer's mask is either a string handed over by the segmentation
//! service (an `http(s)` URL, a local path, or an inline `data:` URL) or
//! a raster produced in-process by a merge. Resolution turns either form
//! into an RGBA raster; remote references go through a [`MaskFetcher`]
//! so this crate never performs I/O itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::data_url::{decode_data_url, encode_png_data_url, is_data_url};
use crate::decode::decode_rgba;
use crate::types::{PipelineError, RgbaImage};

/// Reference to a layer's mask pixels.
#[derive(Debug, Clone)]
pub enum MaskRef {
    /// A reference string from the segmentation service.
    Url(String),
    /// A raster held in memory, produced by a merge.
    Raster(Arc<RgbaImage>),
}

impl MaskRef {
    /// Returns `true` if resolving this reference needs the fetcher.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(url) if !is_data_url(url))
    }

    /// The in-memory raster, if this reference holds one.
    #[must_use]
    pub const fn as_raster(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Self::Raster(raster) => Some(raster),
            Self::Url(_) => None,
        }
    }

    /// A reference string that resolves back to the same pixels.
    ///
    /// Strings are returned as-is; rasters are encoded as PNG `data:`
    /// URLs so a merged layer can be saved and loaded again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageDecode`] if PNG encoding fails.
    pub fn to_reference(&self) -> Result<String, PipelineError> {
        match self {
            Self::Url(url) => Ok(url.clone()),
            Self::Raster(raster) => encode_png_data_url(raster),
        }
    }
}

impl From<String> for MaskRef {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<&str> for MaskRef {
    fn from(url: &str) -> Self {
        Self::Url(url.to_owned())
    }
}

impl From<RgbaImage> for MaskRef {
    fn from(raster: RgbaImage) -> Self {
        Self::Raster(Arc::new(raster))
    }
}

impl PartialEq for MaskRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Url(a), Self::Url(b)) => a == b,
            (Self::Raster(a), Self::Raster(b)) => {
                Arc::ptr_eq(a, b) || (a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw())
            }
            _ => false,
        }
    }
}

impl fmt::Display for MaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) if is_data_url(url) => {
                let media = url
                    .split_once([';', ','])
                    .map_or("data:", |(head, _)| head);
                write!(f, "{media} ({} chars inline)", url.len())
            }
            Self::Url(url) => f.write_str(url),
            Self::Raster(raster) => {
                write!(f, "merged {}x{} raster", raster.width(), raster.height())
            }
        }
    }
}

/// Fetches the bytes behind a remote mask reference.
///
/// Implementations decide what a reference means (HTTP URL, file path,
/// object-store key). Decoding stays with the caller.
pub trait MaskFetcher {
    /// Fetch the encoded image bytes for `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the bytes cannot be retrieved.
    fn fetch(&self, reference: &str) -> impl Future<Output = Result<Vec<u8>, PipelineError>>;
}

/// In-memory [`MaskFetcher`] keyed by reference string.
///
/// Useful when all masks are already at hand, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes served for `reference`.
    pub fn insert(&mut self, reference: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(reference.into(), bytes);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(reference, bytes);
        self
    }
}

impl MaskFetcher for MemoryFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PipelineError> {
        self.entries
            .get(reference)
            .cloned()
            .ok_or_else(|| PipelineError::Fetch {
                reference: reference.to_owned(),
                message: "not found".to_string(),
            })
    }
}

/// Resolve a mask reference to its raster.
///
/// Merged rasters are shared, `data:` URLs are decoded in place, and
/// anything else goes through `fetcher`, bounded by `timeout`.
///
/// # Errors
///
/// Returns [`PipelineError::FetchTimeout`] if the fetch exceeds
/// `timeout`, the fetcher's error if it fails, and
/// [`PipelineError::InvalidDataUrl`], [`PipelineError::EmptyInput`], or
/// [`PipelineError::ImageDecode`] if the bytes do not decode.
pub async fn resolve_mask<F: MaskFetcher>(
    mask: &MaskRef,
    fetcher: &F,
    timeout: Duration,
) -> Result<Arc<RgbaImage>, PipelineError> {
    match mask {
        MaskRef::Raster(raster) => Ok(Arc::clone(raster)),
        MaskRef::Url(url) if is_data_url(url) => {
            let bytes = decode_data_url(url)?;
            decode_rgba(&bytes).map(Arc::new)
        }
        MaskRef::Url(url) => {
            let bytes = tokio::time::timeout(timeout, fetcher.fetch(url))
                .await
                .map_err(|_| PipelineError::FetchTimeout {
                    reference: url.clone(),
                    timeout,
                })??;
            tracing::debug!(reference = %url, bytes = bytes.len(), "fetched mask");
            decode_rgba(&bytes).map(Arc::new)
        }
    }
}
