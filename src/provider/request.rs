//! Request composition: endpoint, headers and body for a provider call.
//!
//! The body is built by hand as `serde_json` values so the wire fields stay
//! under our control; the only per-provider branching is the endpoint path
//! and the presence of the Authorization header.

use super::config::{Provider, ProviderConfig};
use crate::error::AiError;
use crate::message::ChatMessage;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::json;

const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Composer-facing request knobs for one call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a `{"type": "json_object"}` response format.
    pub json_object: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            stream: false,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            json_object: false,
        }
    }
}

/// Resolve the chat-completion endpoint for the provider.
pub fn endpoint(config: &ProviderConfig) -> Result<Url, AiError> {
    let path = match config.provider {
        Provider::OpenAi => "/v1/chat/completions",
        Provider::OllamaCloud | Provider::OllamaLocal => "/api/chat",
    };

    config.host.join(path).map_err(|err| AiError::Transport {
        status: None,
        body: format!("invalid endpoint for host {}: {}", config.host, err),
    })
}

/// Build request headers. The Authorization header is present exactly when
/// an API key is configured; local providers send none.
pub fn headers(config: &ProviderConfig) -> Result<HeaderMap, AiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if !config.api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            AiError::Usage(format!(
                "the configured {} API key contains characters not allowed in a header",
                config.provider.display_name()
            ))
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Build the JSON request body.
pub fn body(
    config: &ProviderConfig,
    messages: &[ChatMessage],
    options: &RequestOptions,
) -> serde_json::Value {
    let mut body = json!({
        "model": config.model,
        "messages": messages,
        "stream": options.stream,
        "temperature": options.temperature,
    });

    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if options.json_object {
        body["response_format"] = json!({"type": "json_object"});
    }

    body
}
