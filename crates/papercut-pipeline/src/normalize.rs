//! Mask normalization: segmentation result shapes to mask references.
//!
//! The segmentation service does not commit to a response shape. Across
//! model versions it has returned a flat array of URLs, an array of
//! records carrying `segmentation` or `combined_mask`, a single record
//! with an `individual_masks` array (sometimes wrapped in a one-element
//! array), and a bare scalar. This module is the only place that shape
//! is inspected; everything downstream sees an ordered list of mask
//! reference strings.
//!
//! Resolution is tried in a fixed order and the first match wins:
//!
//! 1. a one-element array whose element has an `individual_masks` array
//! 2. a record with an `individual_masks` array
//! 3. any other array, taken element by element
//! 4. any other non-empty value, as a single element
//! 5. nothing usable: [`PipelineError::EmptySegmentation`]
//!
//! Each element is then reduced to one reference. Elements that yield
//! none are skipped with a warning; the call only fails when no element
//! resolves.

use serde_json::Value;

use crate::types::PipelineError;

const INDIVIDUAL_MASKS: &str = "individual_masks";
const SEGMENTATION: &str = "segmentation";
const COMBINED_MASK: &str = "combined_mask";

/// Reduce a raw segmentation result to an ordered list of mask
/// references, preserving the service's emission order.
///
/// # Errors
///
/// Returns [`PipelineError::EmptySegmentation`] if `raw` is null or
/// empty, or if none of its elements resolve to a mask reference.
pub fn normalize(raw: &Value) -> Result<Vec<String>, PipelineError> {
    let elements = candidate_elements(raw)?;

    let mut refs = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        match resolve_element(index, element) {
            Ok(reference) => refs.push(reference.to_owned()),
            Err(err) => tracing::warn!(%err, "skipping segmentation element"),
        }
    }

    if refs.is_empty() {
        return Err(PipelineError::EmptySegmentation);
    }
    tracing::debug!(
        elements = elements.len(),
        resolved = refs.len(),
        "normalized segmentation result"
    );
    Ok(refs)
}

/// Pick the sequence of elements to resolve, per the fixed priority order.
fn candidate_elements(raw: &Value) -> Result<&[Value], PipelineError> {
    if is_empty(raw) {
        return Err(PipelineError::EmptySegmentation);
    }

    if let Value::Array(items) = raw
        && let [only] = items.as_slice()
        && let Some(inner) = individual_masks(only)
    {
        return Ok(inner);
    }

    if let Some(inner) = individual_masks(raw) {
        return Ok(inner);
    }

    if let Value::Array(items) = raw {
        return Ok(items);
    }

    Ok(std::slice::from_ref(raw))
}

/// The `individual_masks` array of a record, if it has one.
fn individual_masks(value: &Value) -> Option<&[Value]> {
    value.get(INDIVIDUAL_MASKS)?.as_array().map(Vec::as_slice)
}

/// Reduce one element to its mask reference.
///
/// Plain strings are references already. Records contribute their
/// `segmentation` field, falling back to `combined_mask`.
///
/// # Errors
///
/// Returns [`PipelineError::UnresolvableMaskReference`] if the element
/// yields neither.
pub fn resolve_element(index: usize, element: &Value) -> Result<&str, PipelineError> {
    let reference = match element {
        Value::String(s) => non_empty(s),
        Value::Object(_) => string_field(element, SEGMENTATION)
            .or_else(|| string_field(element, COMBINED_MASK)),
        _ => None,
    };
    reference.ok_or(PipelineError::UnresolvableMaskReference { index })
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str().and_then(non_empty)
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() { None } else { Some(s) }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
