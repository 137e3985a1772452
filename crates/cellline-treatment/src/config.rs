//! API key configuration from a `.properties` file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;

/// Property holding the Gemini API key.
pub const API_KEY_PROPERTY: &str = "gemini.api.key";
/// Environment variable that overrides the property.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Parses Java-style properties: `key=value`, `key: value` or `key value`,
/// `#`/`!` comments, trailing-backslash continuations.
#[must_use]
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    let mut logical = String::new();

    for line in text.lines() {
        let line = line.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        if let Some(continued) = line.strip_suffix('\\') {
            logical.push_str(continued);
            continue;
        }
        logical.push_str(line);
        insert_property(&mut properties, &logical);
        logical.clear();
    }
    if !logical.is_empty() {
        insert_property(&mut properties, &logical);
    }
    properties
}

fn insert_property(properties: &mut HashMap<String, String>, entry: &str) {
    let split = entry
        .find(['=', ':'])
        .or_else(|| entry.find(char::is_whitespace));
    let (key, value) = match split {
        Some(at) => (&entry[..at], &entry[at + 1..]),
        None => (entry, ""),
    };
    let key = key.trim();
    if !key.is_empty() {
        properties.insert(key.to_string(), value.trim().to_string());
    }
}

/// Credentials for the treatment-text service. Built once at startup and
/// passed to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfig {
    pub gemini_api_key: Option<String>,
}

impl ApiConfig {
    #[must_use]
    pub fn new(gemini_api_key: Option<String>) -> Self {
        Self {
            gemini_api_key: gemini_api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn from_properties(text: &str) -> Self {
        Self::new(parse_properties(text).remove(API_KEY_PROPERTY))
    }

    /// Reads `path`. A missing file yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Any I/O error other than the file not existing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "loaded api configuration");
                Ok(Self::from_properties(&text))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "api configuration not found");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the key with `value` when it is non-blank.
    #[must_use]
    pub fn with_override(self, value: Option<String>) -> Self {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(key) => Self::new(Some(key)),
            None => self,
        }
    }

    /// Applies the `GEMINI_API_KEY` environment variable, if set.
    #[must_use]
    pub fn with_env_override(self) -> Self {
        self.with_override(std::env::var(API_KEY_ENV).ok())
    }

    #[must_use]
    pub fn has_key(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}
