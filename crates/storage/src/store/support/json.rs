#![forbid(unsafe_code)]

use super::super::StoreError;

pub(in crate::store) fn encode_json_string_list(items: &[String]) -> String {
    // Deterministic encoding (stable ordering already ensured by callers).
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub(in crate::store) fn decode_json_string_list(
    raw: Option<String>,
) -> Result<Vec<String>, StoreError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<String>>(trimmed)
        .map_err(|_| StoreError::CorruptRow("stored string list is invalid json"))
}

pub(in crate::store) fn encode_bbox(bbox: Option<[f64; 4]>) -> Option<String> {
    bbox.map(|b| serde_json::to_string(&b).unwrap_or_else(|_| "[]".to_string()))
}

pub(in crate::store) fn decode_bbox(raw: Option<String>) -> Result<Option<[f64; 4]>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<[f64; 4]>(trimmed)
        .map(Some)
        .map_err(|_| StoreError::CorruptRow("stored bbox is invalid json"))
}
