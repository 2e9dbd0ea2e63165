use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ai::{Capability, CapabilityState, LanguageModel};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::host::{Outgoing, Request, Response};
use crate::models::{Page, PageContent};
use crate::search::{find_related, FuzzyOptions, SearchIndex};
use crate::services::{IngestReport, Ingestor, ReprocessSummary};

// Message for a finished background ingestion
pub struct IngestResult {
    pub request_id: Option<Value>,
    pub url: String,
    pub result: std::result::Result<IngestReport, String>,
}

pub struct App<M> {
    pub repository: Arc<Repository>,
    capability: Arc<Capability<M>>,
    ingestor: Arc<Ingestor<M>>,

    // Search snapshot, rebuilt after every mutation
    index: SearchIndex,
    search_options: FuzzyOptions,

    // Async state
    pending_ingests: usize,
    ingest_rx: mpsc::Receiver<IngestResult>,
    ingest_tx: mpsc::Sender<IngestResult>,
}

impl<M: LanguageModel> App<M> {
    pub async fn new(config: &Config, model: Option<M>) -> Result<Self> {
        let repository = Repository::open(&config.db_path).await?;
        Self::with_repository(repository, config, model).await
    }

    pub async fn with_repository(
        repository: Repository,
        config: &Config,
        model: Option<M>,
    ) -> Result<Self> {
        let repository = Arc::new(repository);
        let capability = Arc::new(Capability::new(
            model,
            Duration::from_secs(config.ai.download_timeout_secs),
        ));
        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&repository),
            Arc::clone(&capability),
            Duration::from_secs(config.ai.timeout_secs),
            config.ingest.clone(),
        ));

        let search_options = config.search.fuzzy_options();
        let pages = repository.get_all_pages().await?;
        let (ingest_tx, ingest_rx) = mpsc::channel(32);

        Ok(Self {
            repository,
            capability,
            ingestor,
            index: SearchIndex::build(pages, search_options),
            search_options,
            pending_ingests: 0,
            ingest_rx,
            ingest_tx,
        })
    }

    /// Answer a request. Failures become `Response::Failed`.
    pub async fn handle_request(&mut self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_storage() {
                    tracing::error!("Request failed: {}", e);
                } else {
                    tracing::warn!("Request failed: {}", e);
                }
                Response::failed(e)
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::PageContent { data } => {
                let report = self.ingestor.ingest(data).await?;
                self.reload_pages().await?;
                Ok(Response::Ingested(report))
            }

            Request::SearchPages { query } => Ok(Response::Pages {
                results: self.search(&query),
            }),

            Request::GetAllPages => {
                self.reload_pages().await?;
                Ok(Response::Pages {
                    results: self.index.pages().to_vec(),
                })
            }

            Request::GetStats => Ok(Response::Stats {
                stats: self.repository.stats().await?,
            }),

            Request::DeletePage { page_id } => {
                let deleted = self.repository.delete_page(page_id).await?;
                if deleted {
                    self.reload_pages().await?;
                }
                Ok(Response::Deleted { deleted })
            }

            Request::ClearAll => {
                self.repository.clear_all().await?;
                self.reload_pages().await?;
                Ok(Response::Done {})
            }

            Request::GetPage { page_id } => Ok(Response::Page {
                page: self.repository.get_page(page_id).await?,
            }),

            Request::GetPagesByTag { tag } => Ok(Response::Pages {
                results: self.repository.get_pages_by_tag(&tag).await?,
            }),

            Request::FindRelated { tags, exclude_url } => {
                let pages = self.repository.get_all_pages().await?;
                Ok(Response::Related {
                    results: find_related(&pages, &tags, exclude_url.as_deref()),
                })
            }
        }
    }

    /// Matching pages from the current snapshot, newest first.
    pub fn search(&self, query: &str) -> Vec<Page> {
        self.index.search_by_recency(query)
    }

    pub async fn reload_pages(&mut self) -> Result<()> {
        let pages = self.repository.get_all_pages().await?;
        self.index = SearchIndex::build(pages, self.search_options);
        Ok(())
    }

    /// Ingest in the background. The outcome comes back through
    /// [`App::next_ingest_result`].
    pub fn spawn_ingest(&mut self, request_id: Option<Value>, content: PageContent) {
        let ingestor = Arc::clone(&self.ingestor);
        let tx = self.ingest_tx.clone();
        self.pending_ingests += 1;

        tokio::spawn(async move {
            let url = content.url.clone();
            let task = tokio::spawn(async move { ingestor.ingest(content).await });
            // A reply must go out even if ingestion panics
            let result = match task.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("Ingestion task failed: {}", e)),
            };
            if let Err(e) = &result {
                tracing::warn!("Failed to ingest {}: {}", url, e);
            }
            let _ = tx
                .send(IngestResult {
                    request_id,
                    url,
                    result,
                })
                .await;
        });
    }

    pub fn ai_state(&self) -> CapabilityState {
        self.capability.state()
    }

    pub fn pending_ingests(&self) -> usize {
        self.pending_ingests
    }

    pub async fn next_ingest_result(&mut self) -> Option<IngestResult> {
        self.ingest_rx.recv().await
    }

    /// Fold a finished ingestion into the snapshot and build its reply.
    pub async fn on_ingested(&mut self, done: IngestResult) -> Outgoing {
        self.pending_ingests = self.pending_ingests.saturating_sub(1);

        let response = match done.result {
            Ok(report) => {
                if let Err(e) = self.reload_pages().await {
                    tracing::error!("Failed to refresh pages after saving {}: {}", done.url, e);
                }
                Response::Ingested(report)
            }
            Err(error) => Response::Failed { error },
        };
        Outgoing::new(done.request_id, response)
    }

    /// Ingest several pages concurrently, as the command line does.
    pub async fn ingest_all(
        &mut self,
        contents: Vec<PageContent>,
    ) -> Vec<(String, Result<IngestReport>)> {
        let handles: Vec<_> = contents
            .into_iter()
            .map(|content| {
                let ingestor = Arc::clone(&self.ingestor);
                let url = content.url.clone();
                (url, tokio::spawn(async move { ingestor.ingest(content).await }))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Ingestion task failed: {}", e).into()),
            };
            results.push((url, result));
        }

        if let Err(e) = self.reload_pages().await {
            tracing::error!("Failed to refresh pages: {}", e);
        }
        results
    }

    pub async fn reprocess_all(&mut self) -> Result<ReprocessSummary> {
        let summary = self.ingestor.reprocess_all().await?;
        self.reload_pages().await?;
        Ok(summary)
    }

    pub async fn close(self) -> Result<()> {
        let Self {
            repository,
            ingestor,
            ..
        } = self;
        // The ingestor holds the other handle
        drop(ingestor);
        match Arc::try_unwrap(repository) {
            Ok(repository) => repository.close().await,
            Err(_) => {
                tracing::debug!("Repository still shared at shutdown, leaving it to drop");
                Ok(())
            }
        }
    }
}
