//! `data:` URL and bare base64 image payloads.
//!
//! The segmentation service may hand back masks inline as
//! `data:image/png;base64,...` strings, and the original photograph is
//! echoed back as base64 with or without that prefix. Merged masks are
//! re-encoded the same way when they leave the process.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::types::{PipelineError, RgbaImage};

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Returns `true` if `reference` is an inline `data:` URL.
#[must_use]
pub fn is_data_url(reference: &str) -> bool {
    reference
        .get(..DATA_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(DATA_PREFIX))
}

/// Decode the payload of a base64 `data:` URL.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDataUrl`] if `url` is not a `data:`
/// URL, is not base64-encoded, or the payload is not valid base64.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, PipelineError> {
    if !is_data_url(url) {
        return Err(PipelineError::InvalidDataUrl(
            "missing data: scheme".to_string(),
        ));
    }
    let (_, payload) = url
        .split_once(BASE64_MARKER)
        .ok_or_else(|| PipelineError::InvalidDataUrl("payload is not base64".to_string()))?;
    decode_base64(payload)
}

/// Decode a base64 image payload that may or may not carry a `data:`
/// prefix.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDataUrl`] if the payload is not
/// valid base64.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, PipelineError> {
    if is_data_url(payload) {
        decode_data_url(payload)
    } else {
        decode_base64(payload)
    }
}

/// Encode a raster as a `data:image/png;base64,...` URL.
///
/// # Errors
///
/// Returns [`PipelineError::ImageDecode`] if PNG encoding fails.
pub fn encode_png_data_url(image: &RgbaImage) -> Result<String, PipelineError> {
    let png = crate::decode::encode_png(image)?;
    Ok(format!("data:image/png{BASE64_MARKER}{}", STANDARD.encode(png)))
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, PipelineError> {
    let trimmed: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(trimmed)
        .map_err(|e| PipelineError::InvalidDataUrl(e.to_string()))
}
