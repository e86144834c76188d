//! Configuration management for Quill
//!
//! Loads and saves the JSON config file and resolves the model API key.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, expand_home, sessions_dir};

/// Environment variable holding the model API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Model service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_key: String::new(),
            api_base: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    1
}

/// Conversation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Replaces the built-in system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}

/// Optional tools
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolkitConfig {
    #[serde(default)]
    pub continue_story: bool,
}

/// Conversation memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Transcript length at which summarization would be due
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Word cap for a summary; carried for stores that summarize
    #[serde(default = "default_summary_length")]
    pub summary_length: usize,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages: default_max_messages(),
            summary_length: default_summary_length(),
            storage_dir: default_storage_dir(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_summary_length() -> usize {
    2000
}

fn default_storage_dir() -> String {
    "~/.quill/sessions".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub toolkit: ToolkitConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from a location that must exist
    pub async fn load_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path).await
    }

    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Model API key: the environment wins over the config file
    pub fn api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Some(key);
            }
        }

        let key = self.model.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn api_base(&self) -> Option<String> {
        self.model.api_base.clone().filter(|b| !b.is_empty())
    }

    pub fn model_name(&self) -> String {
        self.model.name.clone()
    }

    /// Iteration cap, never below one
    pub fn max_iterations(&self) -> u32 {
        self.agent.max_iterations.max(1)
    }

    /// Directory for stored transcripts
    pub fn storage_dir(&self) -> PathBuf {
        expand_home(&self.memory.storage_dir)
    }
}

/// Write a default config if none exists and create the data directories
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("wrote default config to {:?}", config_path);
    }

    let config = Config::load().await?;
    let storage = config.storage_dir();
    tokio::fs::create_dir_all(&storage).await?;
    info!("session storage ready at {:?}", storage);

    Ok(config)
}
