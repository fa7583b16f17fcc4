//! Recover an invoice record from free-form model output.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{InvexError, Result};
use crate::models::invoice::InvoiceRecord;

/// Slice from the first `{` to the last `}`.
///
/// Tolerates prose and markdown fences around the object. Text holding
/// several JSON-like blocks yields their whole span, which then fails to
/// parse rather than being guessed at.
pub fn locate_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse raw model text into an [`InvoiceRecord`].
///
/// The object must carry an `emitente` object and an `itens` array. Every
/// other field may be missing, null, or of any JSON type; leaves are kept as
/// sent and unknown keys are preserved.
pub fn parse_response(text: &str) -> Result<InvoiceRecord> {
    let candidate = locate_json(text).ok_or_else(|| {
        InvexError::MalformedResponse(format!("no JSON object in response: {}", preview(text)))
    })?;

    let value: Value = serde_json::from_str(candidate).map_err(|e| {
        warn!("Model returned unparseable JSON: {}", preview(candidate));
        InvexError::MalformedResponse(format!("invalid JSON: {}", e))
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| InvexError::MalformedResponse("response is not a JSON object".to_string()))?;

    match object.get("emitente") {
        Some(Value::Object(_)) => {}
        Some(_) => return Err(missing("emitente", "is not an object")),
        None => return Err(missing("emitente", "is missing")),
    }
    match object.get("itens") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(missing("itens", "is not an array")),
        None => return Err(missing("itens", "is missing")),
    }

    let mut record: InvoiceRecord = serde_json::from_str(candidate)
        .map_err(|e| InvexError::MalformedResponse(format!("unexpected field shape: {}", e)))?;

    // Reserved for the artifact's own metadata block
    if record.extra.remove("_metadata").is_some() {
        debug!("Dropped '_metadata' key from model output");
    }

    debug!("Parsed invoice with {} line items", record.item_count());
    Ok(record)
}

fn missing(field: &str, problem: &str) -> InvexError {
    InvexError::MalformedResponse(format!("required field '{}' {}", field, problem))
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(200).collect();
    if short.len() < text.len() {
        format!("{}...", short)
    } else {
        short
    }
}
