//! Provider identity and per-call configuration resolution.
//!
//! Configuration is read fresh from the preferences accessor on every call
//! and treated as immutable for that call's duration. Nothing here touches
//! the network.

use crate::preferences::Preferences;
use reqwest::Url;

/// Preference keys, matching the app shell's settings schema.
mod keys {
    pub const PROVIDER: &str = "aiProvider";
    pub const OLLAMA_CLOUD_API_KEY: &str = "ollamaCloudApiKey";
    pub const OLLAMA_CLOUD_MODEL: &str = "ollamaCloudModel";
    pub const OLLAMA_LOCAL_HOST: &str = "ollamaLocalHost";
    pub const OLLAMA_LOCAL_MODEL: &str = "ollamaLocalModel";
    pub const OPENAI_ENDPOINT: &str = "openaiEndpoint";
    pub const OPENAI_API_KEY: &str = "openaiApiKey";
    pub const OPENAI_MODEL: &str = "openaiModel";
}

const OLLAMA_CLOUD_HOST: &str = "https://ollama.com";
const OLLAMA_LOCAL_DEFAULT_HOST: &str = "http://localhost:11434";
const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com";

const OLLAMA_CLOUD_DEFAULT_MODEL: &str = "gpt-oss:20b-cloud";
const OLLAMA_LOCAL_DEFAULT_MODEL: &str = "llama3.2:latest";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// The supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OllamaCloud,
    OllamaLocal,
    OpenAi,
}

impl Provider {
    /// The identifier stored in preferences.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::OllamaCloud => "ollama-cloud",
            Provider::OllamaLocal => "ollama-local",
            Provider::OpenAi => "openai",
        }
    }

    /// Human-readable name for error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OllamaCloud => "Ollama Cloud",
            Provider::OllamaLocal => "Ollama Local",
            Provider::OpenAi => "OpenAI",
        }
    }

    /// Local providers authenticate by reachability, not by key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::OllamaLocal)
    }
}

/// Resolved configuration for one call.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    /// Always an absolute URL.
    pub host: Url,
    /// Empty when the provider needs no key or none is configured.
    pub api_key: String,
    pub model: String,
}

/// Resolve the active provider configuration from preferences.
///
/// Never fails: an unknown provider id logs a warning and falls back to the
/// Ollama Cloud defaults, and an unparseable stored host falls back to the
/// provider's default host.
pub fn resolve(prefs: &dyn Preferences) -> ProviderConfig {
    let provider_id = prefs.get(keys::PROVIDER, Provider::OllamaCloud.id());

    match provider_id.as_str() {
        "ollama-local" => ProviderConfig {
            provider: Provider::OllamaLocal,
            host: parse_host(
                &prefs.get(keys::OLLAMA_LOCAL_HOST, OLLAMA_LOCAL_DEFAULT_HOST),
                OLLAMA_LOCAL_DEFAULT_HOST,
            ),
            api_key: String::new(),
            model: prefs.get(keys::OLLAMA_LOCAL_MODEL, OLLAMA_LOCAL_DEFAULT_MODEL),
        },
        "openai" => ProviderConfig {
            provider: Provider::OpenAi,
            host: parse_host(
                &prefs.get(keys::OPENAI_ENDPOINT, OPENAI_DEFAULT_ENDPOINT),
                OPENAI_DEFAULT_ENDPOINT,
            ),
            api_key: prefs.get(keys::OPENAI_API_KEY, ""),
            model: prefs.get(keys::OPENAI_MODEL, OPENAI_DEFAULT_MODEL),
        },
        "ollama-cloud" => ollama_cloud(prefs),
        other => {
            // TODO: consider promoting this to a hard Configuration error;
            // today a typoed provider id silently degrades to Ollama Cloud.
            tracing::warn!(target: "llm", provider = other, "unknown AI provider, falling back to ollama-cloud");
            ollama_cloud(prefs)
        }
    }
}

fn ollama_cloud(prefs: &dyn Preferences) -> ProviderConfig {
    ProviderConfig {
        provider: Provider::OllamaCloud,
        host: parse_host(OLLAMA_CLOUD_HOST, OLLAMA_CLOUD_HOST),
        api_key: prefs.get(keys::OLLAMA_CLOUD_API_KEY, ""),
        model: prefs.get(keys::OLLAMA_CLOUD_MODEL, OLLAMA_CLOUD_DEFAULT_MODEL),
    }
}

fn parse_host(configured: &str, default: &str) -> Url {
    match Url::parse(configured) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(target: "llm", host = configured, error = %err, "invalid provider host, using default");
            // The defaults are compile-time constants and always parse.
            Url::parse(default).unwrap_or_else(|_| {
                Url::parse(OLLAMA_CLOUD_HOST).expect("default host URL is valid")
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;

    #[test]
    fn test_defaults_to_ollama_cloud() {
        let config = resolve(&MemoryPreferences::new());
        assert_eq!(config.provider, Provider::OllamaCloud);
        assert_eq!(config.host.as_str(), "https://ollama.com/");
        assert_eq!(config.model, "gpt-oss:20b-cloud");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_openai_fields() {
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "openai")
            .set("openaiApiKey", "sk-test")
            .set("openaiModel", "gpt-4o");
        let config = resolve(&prefs);
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.host.as_str(), "https://api.openai.com/");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let prefs = MemoryPreferences::new().set("aiProvider", "ollama-local");
        let config = resolve(&prefs);
        assert_eq!(config.provider, Provider::OllamaLocal);
        assert_eq!(config.host.as_str(), "http://localhost:11434/");
        assert!(config.api_key.is_empty());
        assert!(!config.provider.requires_api_key());
    }

    #[test]
    fn test_unknown_provider_falls_back_to_cloud_defaults() {
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "mystery-ai")
            .set("ollamaCloudApiKey", "cloud-key");
        let config = resolve(&prefs);
        assert_eq!(config.provider, Provider::OllamaCloud);
        assert_eq!(config.api_key, "cloud-key");
    }

    #[test]
    fn test_invalid_host_falls_back_to_default() {
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "ollama-local")
            .set("ollamaLocalHost", "not a url");
        let config = resolve(&prefs);
        assert_eq!(config.host.as_str(), "http://localhost:11434/");
    }
}
