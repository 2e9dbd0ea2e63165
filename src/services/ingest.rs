use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::ai::{Capability, LanguageModel, Summarizer, TagExtractor};
use crate::config::IngestConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewPage, Page, PageContent, RelatedPage};
use crate::search::find_related;
use crate::text::truncate_chars;

const REPROCESS_CONCURRENCY: usize = 4;

/// Outcome of ingesting one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub page_id: i64,
    pub summary: String,
    pub tags: Vec<String>,
    /// How many stored pages share at least one tag.
    pub related_pages: usize,
    /// The best of those, capped at the configured limit.
    pub related: Vec<RelatedPage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Summarize, tag, store, then look up related pages.
pub struct Ingestor<M> {
    repository: Arc<Repository>,
    summarizer: Summarizer<M>,
    tagger: TagExtractor<M>,
    settings: IngestConfig,
}

impl<M: LanguageModel> Ingestor<M> {
    pub fn new(
        repository: Arc<Repository>,
        capability: Arc<Capability<M>>,
        ai_timeout: Duration,
        settings: IngestConfig,
    ) -> Self {
        Self {
            repository,
            summarizer: Summarizer::new(Arc::clone(&capability), ai_timeout),
            tagger: TagExtractor::new(capability, ai_timeout),
            settings,
        }
    }

    pub async fn ingest(&self, content: PageContent) -> Result<IngestReport> {
        let length = content.text.chars().count();
        if length < self.settings.min_content_len {
            return Err(AppError::ContentTooShort(length));
        }

        tracing::info!("Processing page: {}", content.title);

        let (summary, tags) = self.analyze(&content.text).await;

        let page = NewPage {
            url: content.url.clone(),
            title: content.title.clone(),
            summary: summary.clone(),
            tags: tags.clone(),
            full_text: truncate_chars(&content.text, self.settings.max_stored_text).to_string(),
            favicon: content.favicon,
        };
        let page_id = self.repository.upsert_page(page).await?;
        tracing::info!("Saved page {} ({}) with tags {:?}", page_id, content.title, tags);

        let pages = self.repository.get_all_pages().await?;
        let mut related = find_related(&pages, &tags, Some(&content.url));
        let related_pages = related.len();
        related.truncate(self.settings.related_limit);

        Ok(IngestReport {
            page_id,
            summary,
            tags,
            related_pages,
            related,
        })
    }

    /// Summarize and tag every stored page again from its stored text.
    pub async fn reprocess_all(&self) -> Result<ReprocessSummary> {
        let pages = self.repository.get_all_pages().await?;
        tracing::info!("Reprocessing {} pages", pages.len());

        let results: Vec<bool> = stream::iter(pages)
            .map(|page| async move {
                let url = page.url.clone();
                match self.reprocess(page).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Failed to reprocess {}: {}", url, e);
                        false
                    }
                }
            })
            .buffer_unordered(REPROCESS_CONCURRENCY)
            .collect()
            .await;

        let processed = results.iter().filter(|ok| **ok).count();
        Ok(ReprocessSummary {
            processed,
            failed: results.len() - processed,
        })
    }

    async fn reprocess(&self, page: Page) -> Result<()> {
        let (summary, tags) = self.analyze(&page.full_text).await;
        let updated = self
            .repository
            .update_analysis(page.id, page.full_text, summary, tags)
            .await?;
        if !updated {
            tracing::debug!("Page {} changed while reprocessing, skipped", page.url);
        }
        Ok(())
    }

    async fn analyze(&self, text: &str) -> (String, Vec<String>) {
        tokio::join!(self.summarizer.summarize(text), self.tagger.extract(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::MockModel;

    const ARTICLE: &str = "Ownership is the central idea of the language. Borrowing lets code \
        use values without taking ownership, and lifetimes describe how long borrowing lasts. \
        Ownership rules are checked at compile time.";

    async fn ingestor(model: Option<MockModel>) -> Ingestor<MockModel> {
        let repository = Arc::new(Repository::open_in_memory().await.unwrap());
        Ingestor::new(
            repository,
            Arc::new(Capability::new(model, Duration::from_secs(5))),
            Duration::from_secs(5),
            IngestConfig::default(),
        )
    }

    fn content(url: &str, title: &str, text: &str) -> PageContent {
        PageContent {
            url: url.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            favicon: None,
        }
    }

    #[tokio::test]
    async fn stores_model_summary_and_tags() {
        let model = MockModel::replying("")
            .with_summary("Ownership and borrowing basics.")
            .with_tags(r#"["Rust", "Ownership"]"#);
        let ingestor = ingestor(Some(model)).await;

        let report = ingestor
            .ingest(content("https://rust.test/own", "Ownership", ARTICLE))
            .await
            .unwrap();

        assert_eq!(report.summary, "Ownership and borrowing basics.");
        assert_eq!(report.tags, vec!["Rust", "Ownership"]);
        assert_eq!(report.related_pages, 0);

        let page = ingestor
            .repository
            .get_page(report.page_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.tags, report.tags);
        assert_eq!(page.full_text, ARTICLE);
    }

    #[tokio::test]
    async fn falls_back_to_local_analysis_without_model() {
        let ingestor = ingestor(None).await;

        let report = ingestor
            .ingest(content("https://rust.test/own", "Ownership", ARTICLE))
            .await
            .unwrap();

        assert_eq!(report.tags[0], "Ownership");
        assert!(report.summary.starts_with("Ownership is the central idea"));
    }

    #[tokio::test]
    async fn short_text_is_rejected_and_not_stored() {
        let ingestor = ingestor(None).await;

        let err = ingestor
            .ingest(content("https://rust.test/short", "Short", "too short"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ContentTooShort(9)));
        assert!(ingestor.repository.get_all_pages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_text_is_capped() {
        let ingestor = ingestor(None).await;
        let long = "borrowing ".repeat(1000);

        let report = ingestor
            .ingest(content("https://rust.test/long", "Long", &long))
            .await
            .unwrap();

        let page = ingestor
            .repository
            .get_page(report.page_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.full_text.chars().count(), 5000);
    }

    #[tokio::test]
    async fn reports_related_pages_excluding_itself() {
        let model = MockModel::replying("").with_tags(r#"["Rust", "Memory"]"#);
        let ingestor = ingestor(Some(model)).await;

        let first = ingestor
            .ingest(content("https://rust.test/a", "A", ARTICLE))
            .await
            .unwrap();
        assert_eq!(first.related_pages, 0);

        let second = ingestor
            .ingest(content("https://rust.test/b", "B", ARTICLE))
            .await
            .unwrap();
        assert_eq!(second.related_pages, 1);
        assert_eq!(second.related[0].page.url, "https://rust.test/a");
        assert_eq!(second.related[0].match_score, 2);

        // Saving A again updates it in place and finds B
        let again = ingestor
            .ingest(content("https://rust.test/a", "A2", ARTICLE))
            .await
            .unwrap();
        assert_eq!(again.page_id, first.page_id);
        assert_eq!(again.related[0].page.url, "https://rust.test/b");
    }

    #[tokio::test]
    async fn concurrent_ingests_are_all_stored() {
        let ingestor = Arc::new(ingestor(None).await);

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let ingestor = Arc::clone(&ingestor);
                tokio::spawn(async move {
                    ingestor
                        .ingest(content(&format!("https://rust.test/{}", i), "Page", ARTICLE))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(ingestor.repository.get_all_pages().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn reprocess_retags_stored_pages() {
        let repository = Arc::new(Repository::open_in_memory().await.unwrap());
        repository
            .upsert_page(NewPage {
                url: "https://rust.test/a".into(),
                title: "A".into(),
                summary: "old".into(),
                tags: vec!["Old".into()],
                full_text: ARTICLE.into(),
                favicon: None,
            })
            .await
            .unwrap();

        let model = MockModel::replying("")
            .with_summary("Fresh summary")
            .with_tags(r#"["Fresh"]"#);
        let ingestor = Ingestor::new(
            Arc::clone(&repository),
            Arc::new(Capability::new(Some(model), Duration::from_secs(5))),
            Duration::from_secs(5),
            IngestConfig::default(),
        );

        let summary = ingestor.reprocess_all().await.unwrap();
        assert_eq!(summary, ReprocessSummary { processed: 1, failed: 0 });

        let pages = repository.get_all_pages().await.unwrap();
        assert_eq!(pages[0].tags, vec!["Fresh"]);
        assert_eq!(pages[0].summary, "Fresh summary");
    }

    #[tokio::test]
    async fn reprocess_keeps_a_save_made_meanwhile() {
        let repository = Arc::new(Repository::open_in_memory().await.unwrap());
        let page = |title: &str, text: &str| NewPage {
            url: "https://rust.test/a".into(),
            title: title.into(),
            summary: "old".into(),
            tags: vec!["Old".into()],
            full_text: text.into(),
            favicon: None,
        };
        repository.upsert_page(page("A", ARTICLE)).await.unwrap();

        let model = MockModel::replying("")
            .with_summary("Stale summary")
            .with_tags(r#"["Stale"]"#)
            .with_prompt_delay(Duration::from_millis(200));
        let ingestor = Ingestor::new(
            Arc::clone(&repository),
            Arc::new(Capability::new(Some(model), Duration::from_secs(5))),
            Duration::from_secs(5),
            IngestConfig::default(),
        );

        let save = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            repository
                .upsert_page(page("A, revised", "Revised text"))
                .await
                .unwrap()
        };
        let (summary, _) = tokio::join!(ingestor.reprocess_all(), save);
        assert_eq!(summary.unwrap().failed, 0);

        let pages = repository.get_all_pages().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "A, revised");
        assert_eq!(pages[0].full_text, "Revised text");
        assert_eq!(pages[0].tags, vec!["Old"]);
    }
}
