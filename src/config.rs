use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::options::{SHOW_FAILURES, SHOW_SPACES};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "workbench.json";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Initial values of the option flags
    #[serde(default = "default_options")]
    pub options: BTreeMap<String, bool>,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Grammar loaded when the store holds none
    #[serde(default = "default_sample_grammar")]
    pub sample_grammar: String,
}

/// Debounce configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RefreshConfig {
    /// Delay after a grammar or input edit before refreshing, in milliseconds
    #[serde(default = "default_edit_delay")]
    pub edit_delay_ms: u64,

    /// Delay after an option or start rule change, in milliseconds
    #[serde(default)]
    pub option_delay_ms: u64,
}

fn default_edit_delay() -> u64 {
    250
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            edit_delay_ms: default_edit_delay(),
            option_delay_ms: 0,
        }
    }
}

/// Where the grammar and input are persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// State file path. Defaults to `grammar-workbench/state.json` in the
    /// platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_options() -> BTreeMap<String, bool> {
    BTreeMap::from([(SHOW_FAILURES.to_string(), false), (SHOW_SPACES.to_string(), false)])
}

fn default_sample_grammar() -> String {
    SAMPLE_GRAMMAR.to_string()
}

pub const SAMPLE_GRAMMAR: &str = r#"Arithmetic {
  Exp
    = AddExp

  AddExp
    = AddExp "+" MulExp  -- plus
    | AddExp "-" MulExp  -- minus
    | MulExp

  MulExp
    = MulExp "*" PriExp  -- times
    | MulExp "/" PriExp  -- divide
    | PriExp

  PriExp
    = "(" Exp ")"  -- paren
    | number

  number  (a number)
    = digit+
}
"#;

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig::default(),
            options: default_options(),
            storage: StorageConfig::default(),
            sample_grammar: default_sample_grammar(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Load the first configuration found: `explicit`, then
    /// `{working_dir}/workbench.json`, then `{config_dir}/workbench/config.json`.
    /// Falls back to defaults when none exists.
    pub fn resolve(explicit: Option<&Path>, working_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        for candidate in Self::search_paths(working_dir) {
            if candidate.is_file() {
                tracing::debug!("Loading config from {}", candidate.display());
                return Self::load_from_file(candidate);
            }
        }
        Ok(Self::default())
    }

    fn search_paths(working_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![working_dir.join(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("workbench").join("config.json"));
        }
        paths
    }

    /// The state file to use, if any location is available.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .path
            .clone()
            .or_else(crate::services::storage::FileStore::default_path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.edit_delay_ms > 60_000 {
            return Err(ConfigError::ValidationError(
                "refresh.edit_delay_ms must be <= 60000".to_string(),
            ));
        }

        if self.refresh.option_delay_ms > self.refresh.edit_delay_ms.max(1_000) {
            return Err(ConfigError::ValidationError(
                "refresh.option_delay_ms must not exceed the edit delay (or 1000)".to_string(),
            ));
        }

        if let Some(name) = self.options.keys().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "option name {name:?} cannot be empty"
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
