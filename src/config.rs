//! Configuration file parser for the list of sources (`feeds.toml`).
//!
//! The file is optional, a missing file yields `Config::default()` (no
//! sources). Unknown top-level keys are ignored but logged, since they are
//! usually typos.
//!
//! ```toml
//! concurrency = 4
//! timeout_secs = 30
//!
//! [[source]]
//! name = "news"
//! url = "https://example.com/news"
//! [source.params]
//! "item" = "//article"
//! "item.title" = "./h2/text()"
//! "item.description.textonly" = true
//! ```
use crate::feed::{ConfigError, SourceParams};
use crate::fetch::Source;
use crate::intercept::Html2RssProcessor;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Source `{name}` is misconfigured: {source}")]
    Params {
        name: String,
        #[source]
        source: ConfigError,
    },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of sources fetched at the same time.
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 30,
            sources: Vec::new(),
        }
    }
}

/// One `[[source]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub params: toml::Table,
}

impl SourceConfig {
    /// The `params` table as flat string settings.
    ///
    /// Booleans and numbers become their text form, arrays are joined with
    /// spaces (handy for `clean`) and nested tables become dotted keys.
    pub fn params(&self) -> SourceParams {
        let mut params = SourceParams::new();
        flatten_into(&mut params, "", &self.params);
        params
    }

    pub fn to_source(&self) -> Result<Source, ConfigFileError> {
        let processor =
            Html2RssProcessor::new(&self.params()).map_err(|source| ConfigFileError::Params {
                name: self.name.clone(),
                source,
            })?;
        Ok(Source {
            name: self.name.clone(),
            url: self.url.clone(),
            processor,
        })
    }
}

fn flatten_into(params: &mut SourceParams, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_into(params, &key, nested),
            other => params.insert(key, value_text(other)),
        }
    }
}

fn value_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigFileError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigFileError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigFileError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigFileError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["concurrency", "timeout_secs", "source"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolves every source, failing on the first misconfigured one.
    pub fn to_sources(&self) -> Result<Vec<Source>, ConfigFileError> {
        self.sources.iter().map(SourceConfig::to_source).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
