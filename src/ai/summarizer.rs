use std::sync::Arc;
use std::time::Duration;

use crate::text::truncate_chars;

use super::backend::LanguageModel;
use super::capability::Capability;

const SYSTEM_PROMPT: &str = r#"You summarize web pages for a personal knowledge base.
Reply with a short list of the key points in plain text.
No headings, no markdown, at most three sentences."#;

const MAX_INPUT_CHARS: usize = 10_000;
const FALLBACK_CHARS: usize = 200;

pub struct Summarizer<M> {
    capability: Arc<Capability<M>>,
    timeout: Duration,
}

impl<M: LanguageModel> Summarizer<M> {
    pub fn new(capability: Arc<Capability<M>>, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Summarize `text`. Falls back to a plain excerpt whenever the model is
    /// missing, fails, stalls or answers with nothing.
    pub async fn summarize(&self, text: &str) -> String {
        let Some(model) = self.capability.session().await else {
            return fallback_summary(text);
        };

        let user_message = format!(
            "Summarize the following page:\n\n{}",
            truncate_chars(text, MAX_INPUT_CHARS)
        );

        match tokio::time::timeout(self.timeout, model.prompt(SYSTEM_PROMPT, &user_message)).await
        {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(Ok(_)) => {
                tracing::debug!("Model returned an empty summary");
                fallback_summary(text)
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to generate summary: {}", e);
                fallback_summary(text)
            }
            Err(_) => {
                tracing::warn!("Summary generation timed out after {:?}", self.timeout);
                fallback_summary(text)
            }
        }
    }
}

/// The first 200 characters, trimmed, with `...` when anything was cut.
pub fn fallback_summary(text: &str) -> String {
    let excerpt = truncate_chars(text, FALLBACK_CHARS);
    let mut summary = excerpt.trim().to_string();
    if excerpt.len() < text.len() {
        summary.push_str("...");
    }
    summary
}
