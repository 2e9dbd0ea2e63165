mod content_fetcher;
mod ingest;

pub use content_fetcher::ContentFetcher;
pub use ingest::{IngestReport, Ingestor, ReprocessSummary};
