use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{AppError, Result};

use super::backend::{Availability, LanguageModel};

/// Scripted model for tests. Tag prompts get `tags`, every other prompt gets
/// `summary`; `None` makes the call fail.
pub struct MockModel {
    pub panics: bool,
    pub availability: Availability,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub probe_delay: Duration,
    pub prompt_delay: Duration,
    pub probes: AtomicUsize,
    pub downloads: AtomicUsize,
    pub prompts: AtomicUsize,
}

impl MockModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            panics: false,
            availability: Availability::Readily,
            summary: Some(reply.to_string()),
            tags: Some(reply.to_string()),
            probe_delay: Duration::ZERO,
            prompt_delay: Duration::ZERO,
            probes: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            summary: None,
            tags: None,
            ..Self::replying("")
        }
    }

    /// Panics on every prompt.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::replying("")
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }
}

impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn availability(&self) -> Result<Availability> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.probe_delay).await;
        Ok(self.availability)
    }

    async fn download(&self) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn prompt(&self, system: &str, _user: &str) -> Result<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.prompt_delay).await;
        if self.panics {
            panic!("scripted panic");
        }
        let reply = if system.contains("keywords") {
            &self.tags
        } else {
            &self.summary
        };
        reply
            .clone()
            .ok_or_else(|| AppError::Ai("scripted failure".to_string()))
    }
}
