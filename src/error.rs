//! Error taxonomy for the AI gateway.
//!
//! The variants are deliberately coarse: callers mostly need to distinguish
//! "fix your settings" (Configuration), "check connectivity" (Transport),
//! "retry" (Timeout) and "the model answered garbage" (the two response
//! variants).

use std::time::Duration;

/// Errors produced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// A required setting is missing, e.g. an API key for a hosted provider.
    /// Raised before any network call.
    #[error("missing API key; please configure your {provider} API key in Settings")]
    Configuration { provider: String },

    /// Network failure or a non-2xx HTTP status. `status` is `None` when the
    /// request never produced a response.
    #[error("AI HTTP {}: {body}", display_status(.status))]
    Transport { status: Option<u16>, body: String },

    /// The per-call deadline elapsed before the provider responded.
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),

    /// The model's answer did not contain a parseable JSON object. Carries a
    /// whitespace-collapsed snippet (at most 400 chars), never the full text.
    #[error("AI response is not valid JSON: {reason}")]
    MalformedStructuredResponse { reason: String, snippet: String },

    /// A 2xx response matched none of the known provider envelope shapes.
    #[error("AI returned unexpected response format: {body}")]
    UnrecognizedResponseShape { body: String },

    /// Caller contract violation, e.g. streaming chat without a chunk sink.
    #[error("usage error: {0}")]
    Usage(String),

    /// A prompt template failed to render.
    #[error("prompt template error: {0}")]
    Template(#[from] handlebars::RenderError),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "?".to_string(),
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Transport {
            status: err.status().map(|s| s.as_u16()),
            body: err.to_string(),
        }
    }
}

impl AiError {
    /// Construct the missing-key error with the provider's display name.
    pub fn missing_api_key(provider_name: &str) -> Self {
        AiError::Configuration {
            provider: provider_name.to_string(),
        }
    }
}
