use std::future::Future;

use crate::config::{AiBackendKind, AiConfig};
use crate::error::Result;

use super::claude::ClaudeClient;
use super::ollama::OllamaClient;

/// What a model reports before its first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Readily,
    AfterDownload,
    No,
}

/// A generative text model the summarizer and tag extractor can prompt.
pub trait LanguageModel: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn availability(&self) -> impl Future<Output = Result<Availability>> + Send;

    /// Fetch model weights. Only called after `availability` reported `AfterDownload`.
    fn download(&self) -> impl Future<Output = Result<()>> + Send;

    fn prompt(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;
}

/// The configured model backend.
pub enum Backend {
    Ollama(OllamaClient),
    Claude(ClaudeClient),
}

impl Backend {
    /// Returns `None` when AI is disabled or cannot be set up, in which case
    /// every caller falls back to local computation.
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let backend = match config.backend {
            AiBackendKind::None => return None,
            AiBackendKind::Ollama => {
                OllamaClient::new(config.ollama_base_url.clone(), config.ollama_model.clone())
                    .map(Backend::Ollama)
            }
            AiBackendKind::Claude => {
                let api_key = config.claude_api_key.clone()?;
                ClaudeClient::new(api_key, config.claude_model.clone()).map(Backend::Claude)
            }
        };

        match backend {
            Ok(backend) => Some(backend),
            Err(e) => {
                tracing::error!("Failed to set up AI backend: {}", e);
                None
            }
        }
    }
}

impl LanguageModel for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::Ollama(client) => client.name(),
            Backend::Claude(client) => client.name(),
        }
    }

    async fn availability(&self) -> Result<Availability> {
        match self {
            Backend::Ollama(client) => client.availability().await,
            Backend::Claude(client) => client.availability().await,
        }
    }

    async fn download(&self) -> Result<()> {
        match self {
            Backend::Ollama(client) => client.download().await,
            Backend::Claude(client) => client.download().await,
        }
    }

    async fn prompt(&self, system: &str, user: &str) -> Result<String> {
        match self {
            Backend::Ollama(client) => client.prompt(system, user).await,
            Backend::Claude(client) => client.prompt(system, user).await,
        }
    }
}
