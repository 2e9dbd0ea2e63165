use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::backend::{Availability, LanguageModel};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a local Ollama server: the on-device model backend.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Deserialize)]
struct InstalledModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequest {
    model: String,
    stream: bool,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn is_installed(&self, installed: &[InstalledModel]) -> bool {
        let wanted = self.model.as_str();
        installed.iter().any(|m| {
            m.name == wanted || m.name.strip_suffix(":latest") == Some(wanted)
        })
    }
}

impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn availability(&self) -> Result<Availability> {
        let response = self
            .client
            .get(self.endpoint("tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Ollama tags request failed: {}", response.status());
            return Ok(Availability::No);
        }

        let tags: TagsResponse = response.json().await?;
        if self.is_installed(&tags.models) {
            Ok(Availability::Readily)
        } else {
            Ok(Availability::AfterDownload)
        }
    }

    async fn download(&self) -> Result<()> {
        let request = PullRequest {
            model: self.model.clone(),
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("pull"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::Ai(format!("model pull failed: {}", error_text)));
        }
        Ok(())
    }

    async fn prompt(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("chat"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::Ai(format!("ollama chat error: {}", error_text)));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat.message.content)
    }
}
