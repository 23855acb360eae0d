use serde_json::Value;
use stream_mapper_core::PathExpr;

use crate::errors::HarnessError;

/// Extracts one field from a complete (non-streaming) JSON response body.
///
/// Uses the same path grammar as the streaming mappings. A `null` at the
/// path is returned as a value; a path that resolves to nothing is
/// [`HarnessError::NotFound`].
pub fn extract_field(body: &[u8], path: &str) -> Result<Value, HarnessError> {
    let expr = PathExpr::parse(path)?;
    let document: Value =
        serde_json::from_slice(body).map_err(|e| HarnessError::InvalidBody(e.to_string()))?;
    expr.resolve(&document)
        .cloned()
        .ok_or_else(|| HarnessError::NotFound {
            path: expr.as_str().to_string(),
        })
}
