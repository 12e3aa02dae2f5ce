//! Extraction of a single JSON object from free-form model output.
//!
//! Models wrap their JSON in prose or markdown fences despite being asked
//! not to. The heuristic here slices from the first `{` to the last `}` and
//! parses that span. It is deliberately naive about multiple brace-balanced
//! objects in one answer (the first-to-last span fails to parse); prompts
//! are written assuming exactly this behavior, so do not "improve" it.

use crate::error::AiError;
use serde_json::Value;

const SNIPPET_LIMIT: usize = 400;

/// Extract and parse the embedded JSON object from `text`.
pub fn extract_json(text: &str) -> Result<Value, AiError> {
    let start = text.find('{');
    let end = text.rfind('}');

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => {
            return Err(AiError::MalformedStructuredResponse {
                reason: "no JSON object found".to_string(),
                snippet: String::new(),
            })
        }
    };

    let slice = &text[start..=end];
    serde_json::from_str(slice).map_err(|err| AiError::MalformedStructuredResponse {
        reason: err.to_string(),
        snippet: snippet(slice),
    })
}

/// Collapse whitespace and cap length for diagnostics. Never returns the
/// full original text.
pub(crate) fn snippet(slice: &str) -> String {
    let collapsed = slice.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_LIMIT).collect()
}
