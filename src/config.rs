use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::search::FuzzyOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiBackendKind {
    Ollama,
    Claude,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_backend")]
    pub backend: AiBackendKind,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_claude_model")]
    pub claude_model: String,

    /// Upper bound for a single summarize/tag call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound for the first probe, which may pull the model.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_min_match_len")]
    pub min_match_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,

    #[serde(default = "default_max_stored_text")]
    pub max_stored_text: usize,

    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("context-recall");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("pages.db").to_string_lossy().to_string()
}

fn default_backend() -> AiBackendKind {
    AiBackendKind::Ollama
}

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:3b-instruct".to_string()
}

fn default_claude_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_download_timeout_secs() -> u64 {
    900
}

fn default_threshold() -> f64 {
    0.4
}

fn default_min_match_len() -> usize {
    2
}

fn default_min_content_len() -> usize {
    100
}

fn default_max_stored_text() -> usize {
    5000
}

fn default_related_limit() -> usize {
    3
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_ollama_model(),
            claude_api_key: None,
            claude_model: default_claude_model(),
            timeout_secs: default_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_match_len: default_min_match_len(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_content_len: default_min_content_len(),
            max_stored_text: default_max_stored_text(),
            related_limit: default_related_limit(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ai: AiConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn fuzzy_options(&self) -> FuzzyOptions {
        FuzzyOptions {
            threshold: self.threshold,
            min_match_len: self.min_match_len,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(AppError::Config(format!(
                "search.threshold must be within 0.0..=1.0, got {}",
                self.search.threshold
            )));
        }
        if self.search.min_match_len == 0 {
            return Err(AppError::Config("search.min_match_len must be at least 1".into()));
        }
        if self.ai.backend == AiBackendKind::Claude && self.ai.claude_api_key.is_none() {
            tracing::warn!("Claude backend selected without claude_api_key; AI features disabled");
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("context-recall")
            .join("config.toml")
    }
}
