use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    BackendKind, CompileConfig, FileExtension, Language, RunConfig, RuntimeConfig,
    TranspileConfig, normalize_tag,
};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runnr.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Runnr
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds to wait for a worker interpreter to report readiness
    #[serde(default = "default_worker_ready_timeout")]
    pub worker_ready_timeout: f64,

    /// Parent directory for toolchain scratch directories (system temp dir if unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Language configurations keyed by canonical language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            worker_ready_timeout: default_worker_ready_timeout(),
            work_dir: None,
            languages: HashMap::new(),
        }
    }

    /// Get a language by canonical ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Resolve a raw language tag to its canonical ID and configuration
    ///
    /// The tag is matched case- and whitespace-insensitively against canonical
    /// IDs first, then against aliases.
    pub fn resolve(&self, tag: &str) -> Option<(&str, &Language)> {
        let normalized = normalize_tag(tag);
        if normalized.is_empty() {
            return None;
        }

        if let Some((id, lang)) = self.languages.get_key_value(normalized.as_str()) {
            return Some((id.as_str(), lang));
        }

        self.languages
            .iter()
            .find(|(_, lang)| lang.has_alias(&normalized))
            .map(|(id, lang)| (id.as_str(), lang))
    }

    /// Resolve the language of a source file from its extension
    pub fn language_for_path(&self, path: impl AsRef<Path>) -> Option<(&str, &Language)> {
        let extension = path.as_ref().extension()?.to_str()?;
        let mut candidates: Vec<_> = self
            .languages
            .iter()
            .filter(|(_, lang)| lang.extension.matches(extension))
            .collect();
        candidates.sort_by_key(|(id, _)| id.as_str());
        candidates
            .into_iter()
            .next()
            .map(|(id, lang)| (id.as_str(), lang))
    }

    /// Canonical IDs of every configured language, sorted
    pub fn language_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.languages.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Worker readiness timeout as a duration
    pub fn worker_ready_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.worker_ready_timeout.max(0.0))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_worker_ready_timeout() -> f64 {
    30.0
}
