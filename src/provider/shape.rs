//! Response shape probing.
//!
//! The three providers answer with divergent envelopes. Instead of ad-hoc
//! branching we keep ordered strategy tables: each probe tries one known
//! shape, and the first non-empty match wins. Supporting a new provider
//! shape means appending a probe, not growing a conditional.

use crate::error::AiError;
use serde_json::Value;

type Probe = for<'a> fn(&'a Value) -> Option<&'a str>;

/// Ollama non-streaming and streaming: `{"message": {"content": ...}}`
fn message_content(value: &Value) -> Option<&str> {
    value.get("message")?.get("content")?.as_str()
}

/// OpenAI streaming delta: `{"choices": [{"delta": {"content": ...}}]}`
fn choices_delta_content(value: &Value) -> Option<&str> {
    value.get("choices")?.get(0)?.get("delta")?.get("content")?.as_str()
}

/// OpenAI non-streaming: `{"choices": [{"message": {"content": ...}}]}`
fn choices_message_content(value: &Value) -> Option<&str> {
    value.get("choices")?.get(0)?.get("message")?.get("content")?.as_str()
}

/// A bare JSON string body.
fn raw_string(value: &Value) -> Option<&str> {
    value.as_str()
}

/// `{"content": ...}`
fn top_level_content(value: &Value) -> Option<&str> {
    value.get("content")?.as_str()
}

/// Ollama `/api/generate` style: `{"response": ...}`
fn top_level_response(value: &Value) -> Option<&str> {
    value.get("response")?.as_str()
}

/// Probe order for one streaming frame.
const DELTA_PROBES: &[Probe] = &[
    message_content,
    choices_delta_content,
    top_level_content,
    top_level_response,
];

/// Probe order for a complete (non-streaming) response document.
const DOCUMENT_PROBES: &[Probe] = &[
    message_content,
    choices_message_content,
    raw_string,
    top_level_content,
    top_level_response,
];

fn first_non_empty<'a>(probes: &[Probe], value: &'a Value) -> Option<&'a str> {
    probes
        .iter()
        .filter_map(|probe| probe(value))
        .find(|text| !text.is_empty())
}

/// Extract the delta text from one parsed streaming frame. `None` means the
/// frame carries no content (role-only deltas, finish markers, etc).
pub fn delta_text(frame: &Value) -> Option<&str> {
    first_non_empty(DELTA_PROBES, frame)
}

/// Extract assistant text from a complete response document.
///
/// Fails with [`AiError::UnrecognizedResponseShape`] when no known shape
/// matches, carrying a length-bounded rendering of the body.
pub fn normalize(document: &Value) -> Result<String, AiError> {
    match first_non_empty(DOCUMENT_PROBES, document) {
        Some(text) => Ok(text.to_string()),
        None => Err(AiError::UnrecognizedResponseShape {
            body: bounded(&document.to_string()),
        }),
    }
}

/// Truncate diagnostics to at most 400 characters.
pub(crate) fn bounded(text: &str) -> String {
    text.chars().take(400).collect()
}
