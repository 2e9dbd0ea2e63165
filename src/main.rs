mod ai;
mod app;
mod config;
mod db;
mod error;
mod host;
mod models;
mod search;
mod services;
mod text;

use ai::{Backend, CapabilityState};
use app::App;
use config::Config;
use error::Result;
use models::Page;
use services::ContentFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout carries native messages, so logs go to stderr (warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;
    let model = Backend::from_config(&config.ai);
    let mut app = App::new(&config, model).await?;

    match args.get(1).map(String::as_str) {
        Some("--ingest") => {
            if args.len() < 3 {
                eprintln!("Usage: context-recall --ingest <url>...");
            } else {
                ingest_urls(&mut app, &args[2..]).await;
                print_ai_state(&app);
            }
        }

        Some("--search") => {
            let query = args[2..].join(" ");
            let results = app.search(&query);
            if results.is_empty() {
                println!("No pages match {:?}", query);
            }
            for page in &results {
                print_page(page);
            }
        }

        Some("--stats") => {
            let stats = app.repository.stats().await?;
            println!("Pages: {}", stats.total_pages);
            println!("Tags:  {}", stats.total_tags);
            if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                println!("Oldest: {}", oldest.format("%Y-%m-%d %H:%M"));
                println!("Newest: {}", newest.format("%Y-%m-%d %H:%M"));
            }
        }

        Some("--clear") => {
            app.repository.clear_all().await?;
            println!("Cleared all pages");
        }

        Some("--reprocess") => {
            let summary = app.reprocess_all().await?;
            println!(
                "Reprocessed {} pages ({} failed)",
                summary.processed, summary.failed
            );
            print_ai_state(&app);
        }

        // The browser launches the host with the extension origin as argument
        _ => host::serve(&mut app, tokio::io::stdin(), tokio::io::stdout()).await?,
    }

    app.close().await
}

async fn ingest_urls(app: &mut App<Backend>, urls: &[String]) {
    let fetcher = ContentFetcher::new();
    let contents = fetcher.fetch_all(urls).await;

    for (url, result) in app.ingest_all(contents).await {
        match result {
            Ok(report) => {
                println!("Saved {}", url);
                println!("  Tags: {}", report.tags.join(", "));
                println!("  Summary: {}", report.summary);
                if report.related_pages > 0 {
                    println!("  Related pages: {}", report.related_pages);
                    for related in &report.related {
                        println!(
                            "    {} ({})",
                            related.page.title,
                            related.common_tags.join(", ")
                        );
                    }
                }
            }
            Err(e) => eprintln!("Failed to save {}: {}", url, e),
        }
    }
}

fn print_ai_state(app: &App<Backend>) {
    if app.ai_state() != CapabilityState::Ready {
        println!("No generative model was available; summaries and tags were computed locally");
    }
}

fn print_page(page: &Page) {
    println!(
        "{}  {}",
        page.timestamp.format("%Y-%m-%d %H:%M"),
        page.title
    );
    println!("    {}", page.url);
    if !page.tags.is_empty() {
        println!("    [{}]", page.tags.join(", "));
    }
}
