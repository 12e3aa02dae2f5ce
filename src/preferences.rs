//! Preferences access boundary.
//!
//! The gateway never owns settings storage; it reads provider identity,
//! hosts, keys and model names through the [`Preferences`] trait. The app
//! shell persists them elsewhere. Two implementations are provided:
//! - [`FilePreferences`]: a flat JSON object loaded from
//!   `$XDG_CONFIG_HOME/lexibird/preferences.json` (or `~/.config/...`)
//! - [`MemoryPreferences`]: in-memory map for tests and CLI overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Read-only key/value settings accessor.
///
/// `get` never fails: absent keys resolve to the supplied default, which is
/// also how empty stores behave in the app shell.
pub trait Preferences: Send + Sync {
    fn get(&self, key: &str, default: &str) -> String;
}

/// Preferences backed by a flat JSON object on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilePreferences {
    pub values: HashMap<String, String>,
}

impl FilePreferences {
    /// Load from the default location. A missing file yields empty
    /// preferences (every lookup falls back to its default).
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from a specific path.
    pub fn load_from(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let prefs: FilePreferences = serde_json::from_str(&content)?;
        Ok(prefs)
    }

    /// Default preferences file path.
    pub fn config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("lexibird/preferences.json");
        }

        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config/lexibird/preferences.json");
        }

        PathBuf::from("preferences.json")
    }
}

impl Preferences for FilePreferences {
    fn get(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }
}

/// In-memory preferences, mainly for tests and one-off CLI overrides.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: HashMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }
}
