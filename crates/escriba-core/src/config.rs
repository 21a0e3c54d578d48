//! Application configuration, persisted as a single JSON document.
//!
//! Loaded once at startup; mutated only through an explicit [`Config::save`].
//! Loading is lenient: a missing or malformed file yields defaults so the
//! application always starts. Saving validates and writes atomically.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Expected prefix of an OpenAI API key. Other values are accepted with a
/// warning; self-hosted servers use arbitrary tokens.
const API_KEY_PREFIX: &str = "sk-";

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 5;

/// Format the exporter writes transcripts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,

    /// Transcript destination; `None` writes beside each source file.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Concurrent transcription workers, 1–5.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// ISO language code, or "auto" for detection.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_max_workers() -> usize {
    3
}

fn default_language() -> String {
    "auto".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            output_dir: None,
            max_workers: default_max_workers(),
            language: default_language(),
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_workers must be between {MIN_WORKERS} and {MAX_WORKERS}, got {0}")]
    WorkerCount(usize),
    #[error("API key must not be empty")]
    EmptyApiKey,
    #[error("could not determine the user configuration directory")]
    NoConfigDir,
    #[error("failed to write config to {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Config {
    /// Per-user config location: `<config dir>/escriba/config.json`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("escriba").join("config.json"))
    }

    /// Load the config, falling back to defaults on any problem. Never fails:
    /// a broken config file must not keep the application from starting.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("no user config directory; using default configuration");
                Self::default()
            }
        }
    }

    pub(crate) fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file yet, using defaults");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read config, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed config, using defaults");
                Self::default()
            }
        }
    }

    /// Validate and persist. Writes to a temp file in the target directory
    /// and renames over the destination, so a crash mid-write can never
    /// leave a truncated config behind.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub(crate) fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            warn!("API key does not start with '{API_KEY_PREFIX}'; saving anyway");
        }

        let write_err = |source: io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other).map_err(write_err)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.max_workers) {
            return Err(ConfigError::WorkerCount(self.max_workers));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(())
    }

    /// Language hint for the API; `None` when set to auto-detect.
    pub fn language_hint(&self) -> Option<&str> {
        let language = self.language.trim();
        (!language.is_empty() && language != "auto").then_some(language)
    }
}
