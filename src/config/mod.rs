//! Configuration management for Sanad
//!
//! Loads the TOML configuration, applies `SANAD_*` environment overrides and
//! validates the result before any service is constructed.

use crate::error::{Result, SanadError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Backend names understood by the generation layer
pub const BACKEND_OLLAMA: &str = "ollama";
pub const BACKEND_OPENAI: &str = "openai";

/// Upper bound for any search request limit
pub const SEARCH_LIMIT_CEILING: usize = 20;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_file: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub batch_size: usize,
}

/// Persisted index artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub vectors_file: PathBuf,
    pub mapping_file: PathBuf,
}

/// Generative backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Preference order, first backend that initializes wins
    pub backends: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

/// Request limits for the search operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 20,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SanadError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SanadError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults. Run 'sanad config init' to create one.",
                path.display()
            );
            let mut config = Config::default();
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            return Ok(config);
        }

        Self::load(&path)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SanadError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SANAD_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SANAD_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "LLM__ENABLED" => {
                self.llm.enabled = value.parse().map_err(|_| SanadError::InvalidConfigValue {
                    path: path.to_string(),
                    message: format!("Cannot parse '{}' as boolean", value),
                })?;
            }
            "LLM__BACKENDS" => {
                self.llm.backends = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "LLM__OLLAMA_URL" => {
                self.llm.ollama.url = value.to_string();
            }
            "LLM__OLLAMA_MODEL" => {
                self.llm.ollama.model = value.to_string();
            }
            "LLM__OPENAI_MODEL" => {
                self.llm.openai.model = value.to_string();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Resolved data directory (with `~/` expanded)
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    /// Resolve a path relative to the data directory unless it is absolute
    pub fn resolve_data_path(&self, path: &Path) -> Result<PathBuf> {
        let expanded = expand_path(path)?;
        if expanded.is_absolute() {
            Ok(expanded)
        } else {
            Ok(self.data_dir()?.join(expanded))
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SanadError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("sanad").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.sanad"),
                database_file: PathBuf::from("documents.sqlite"),
            },
            embedding: EmbeddingConfig {
                model: "paraphrase-multilingual-minilm-l12-v2".to_string(),
                cache_dir: None,
                batch_size: 32,
            },
            index: IndexConfig {
                vectors_file: PathBuf::from("index/documents_index.vec"),
                mapping_file: PathBuf::from("index/documents_mapping.json"),
            },
            llm: LlmConfig {
                enabled: true,
                backends: vec![BACKEND_OLLAMA.to_string(), BACKEND_OPENAI.to_string()],
                temperature: 0.7,
                max_tokens: 512,
                timeout_secs: 60,
                ollama: OllamaConfig {
                    url: "http://localhost:11434".to_string(),
                    model: "llama2".to_string(),
                },
                openai: OpenAiConfig {
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    api_key_env: "OPENAI_API_KEY".to_string(),
                },
            },
            search: SearchConfig::default(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SanadError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SanadError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
