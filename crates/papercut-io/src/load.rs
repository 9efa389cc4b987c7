//! Reading segmentation responses and source images from disk.

use std::path::Path;

use papercut_pipeline::{SceneConfig, SegmentationResponse, Session};
use serde_json::Value;

use crate::error::IoError;

/// Read a whole file.
///
/// # Errors
///
/// Returns [`IoError::File`] if the file cannot be read.
pub async fn read_bytes(path: &Path) -> Result<Vec<u8>, IoError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| IoError::file(path, e))
}

/// Read a segmentation response saved as JSON.
///
/// Both the service envelope and a bare mask payload are accepted.
///
/// # Errors
///
/// Returns [`IoError::File`] if the file cannot be read,
/// [`IoError::Json`] if it is not JSON, and [`IoError::Pipeline`] if
/// the envelope is malformed.
pub async fn read_response(path: &Path) -> Result<SegmentationResponse, IoError> {
    let bytes = read_bytes(path).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    Ok(SegmentationResponse::from_value(value)?)
}

/// Open a session from a response file and an optional image file.
///
/// Without `image_path` the source image must be embedded in the
/// response as `originalImage`.
///
/// # Errors
///
/// Returns any error from reading either file, and
/// [`IoError::Pipeline`] if the session cannot be started.
pub async fn open_session(
    config: SceneConfig,
    response_path: &Path,
    image_path: Option<&Path>,
) -> Result<Session, IoError> {
    let response = read_response(response_path).await?;
    let image = match image_path {
        Some(path) => Some(read_bytes(path).await?),
        None => None,
    };
    tracing::debug!(
        response = %response_path.display(),
        embedded_image = image.is_none(),
        "opening session"
    );
    Ok(Session::from_response(config, response, image.as_deref())?)
}
