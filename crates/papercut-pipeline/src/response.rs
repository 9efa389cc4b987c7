//! The segmentation service's response envelope.
//!
//! A successful call returns `{"success": true, "masks": ..., "originalImage": ...}`
//! where `masks` is any of the shapes [`normalize`](crate::normalize::normalize)
//! accepts and `originalImage` is the source photo as base64 (with or
//! without a `data:` prefix). A failed call carries an `error` string.
//! Files saved without the envelope hold the `masks` value alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data_url::decode_base64_image;
use crate::types::PipelineError;

const MASKS: &str = "masks";

/// A parsed segmentation response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationResponse {
    /// Explicit success flag. Absent means success unless `error` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Raw mask payload in any supported shape.
    #[serde(default)]
    pub masks: Value,
    /// Source image as base64 or a `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    /// Failure message from the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The usable contents of a successful response.
#[derive(Debug, Clone)]
pub struct SegmentationParts {
    /// Raw mask payload, ready for normalization.
    pub masks: Value,
    /// Decoded bytes of the source image, if the response carried one.
    pub source_image: Option<Vec<u8>>,
}

impl SegmentationResponse {
    /// Interpret an arbitrary JSON value as a response.
    ///
    /// Objects with a `masks`, `error`, or `success` key are read as an
    /// envelope; anything else is taken to be a bare mask payload.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SegmentationFailed`] if an envelope is
    /// malformed.
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        let is_envelope = value.as_object().is_some_and(|map| {
            map.contains_key(MASKS) || map.contains_key("error") || map.contains_key("success")
        });
        if is_envelope {
            serde_json::from_value(value)
                .map_err(|err| PipelineError::SegmentationFailed(format!("malformed response: {err}")))
        } else {
            Ok(Self {
                masks: value,
                ..Self::default()
            })
        }
    }

    /// Whether the service reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.success != Some(false)
    }

    /// Split into the mask payload and the decoded source image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SegmentationFailed`] if the service
    /// reported failure, and [`PipelineError::InvalidDataUrl`] if
    /// `originalImage` is not valid base64.
    pub fn into_parts(self) -> Result<SegmentationParts, PipelineError> {
        if !self.is_success() {
            let message = self
                .error
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(PipelineError::SegmentationFailed(message));
        }

        let source_image = self
            .original_image
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(decode_base64_image)
            .transpose()?;

        Ok(SegmentationParts {
            masks: self.masks,
            source_image,
        })
    }
}
