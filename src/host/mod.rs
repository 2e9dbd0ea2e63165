//! Browser native-messaging host.
//!
//! Frames are read on their own task so a half-read frame is never lost to
//! `select!` cancellation. Replies go through a single writer task that owns
//! the output stream.

mod protocol;
mod transport;

use protocol::Incoming;
pub use protocol::{Outgoing, Request, Response};
use transport::{read_message, write_message, MAX_OUTGOING};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::ai::LanguageModel;
use crate::app::App;
use crate::error::Result;

/// Serve requests until the browser closes `reader`, then wait for any
/// ingestion still in flight so its reply is delivered.
pub async fn serve<M, R, W>(app: &mut App<M>, reader: R, writer: W) -> Result<()>
where
    M: LanguageModel,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (frame_tx, mut frame_rx) = mpsc::channel(16);
    let reader_task = tokio::spawn(read_frames(reader, frame_tx));

    let (reply_tx, reply_rx) = mpsc::channel(32);
    let writer_task = tokio::spawn(write_frames(writer, reply_rx));

    let mut reading = true;
    while reading || app.pending_ingests() > 0 {
        tokio::select! {
            frame = frame_rx.recv(), if reading => match frame {
                Some(Ok(bytes)) => {
                    if let Some(reply) = handle_frame(app, &bytes).await {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("Failed to read message: {}", e);
                    reading = false;
                }
                None => reading = false,
            },
            Some(done) = app.next_ingest_result() => {
                let reply = app.on_ingested(done).await;
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(reply_tx);
    reader_task.abort();
    if let Err(e) = writer_task.await {
        tracing::error!("Writer task failed: {}", e);
    }
    Ok(())
}

async fn handle_frame<M: LanguageModel>(app: &mut App<M>, bytes: &[u8]) -> Option<Outgoing> {
    let incoming = match Incoming::parse(bytes) {
        Ok(incoming) => incoming,
        Err((request_id, error)) => {
            tracing::warn!("{}", error);
            return Some(Outgoing::new(request_id, Response::failed(error)));
        }
    };

    match incoming.request {
        Request::PageContent { data } => {
            app.spawn_ingest(incoming.request_id, data);
            None
        }
        request => {
            let response = app.handle_request(request).await;
            Some(Outgoing::new(incoming.request_id, response))
        }
    }
}

async fn read_frames<R>(mut reader: R, tx: mpsc::Sender<Result<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

async fn write_frames<W>(mut writer: W, mut rx: mpsc::Receiver<Outgoing>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        let payload = match encode(reply) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode reply: {}", e);
                continue;
            }
        };
        if let Err(e) = write_message(&mut writer, &payload).await {
            tracing::error!("Failed to write reply: {}", e);
            break;
        }
    }
}

/// Serialize a reply, shrinking it to fit the browser's frame limit.
fn encode(reply: Outgoing) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&reply)?;
    if payload.len() <= MAX_OUTGOING {
        return Ok(payload);
    }

    tracing::warn!(
        "Reply of {} bytes is too large, dropping page text",
        payload.len()
    );
    let Outgoing {
        request_id,
        response,
        ..
    } = reply;
    let slim = serde_json::to_vec(&Outgoing::new(
        request_id.clone(),
        response.without_full_text(),
    ))?;
    if slim.len() <= MAX_OUTGOING {
        return Ok(slim);
    }

    let failed = Response::failed(format!(
        "Reply of {} bytes exceeds the {} byte message limit",
        slim.len(),
        MAX_OUTGOING
    ));
    Ok(serde_json::to_vec(&Outgoing::new(request_id, failed))?)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::io::{duplex, DuplexStream};

    use super::*;
    use crate::ai::testing::MockModel;
    use crate::config::Config;
    use crate::db::Repository;
    use crate::models::Page;

    const ARTICLE: &str = "Tokio is an asynchronous runtime for the Rust programming language. \
        It provides the building blocks needed for writing network applications.";

    async fn app() -> App<MockModel> {
        let config = Config {
            db_path: ":memory:".to_string(),
            ..Config::default()
        };
        let repository = Repository::open_in_memory().await.unwrap();
        App::with_repository(repository, &config, None).await.unwrap()
    }

    async fn send(stream: &mut DuplexStream, message: Value) {
        write_message(stream, message.to_string().as_bytes())
            .await
            .unwrap();
    }

    async fn receive(stream: &mut DuplexStream) -> Value {
        let frame = read_message(stream).await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn serves_a_session_until_input_closes() {
        let mut app = app().await;
        let (mut to_host, host_in) = duplex(64 * 1024);
        let (host_out, mut from_host) = duplex(64 * 1024);

        let client = async move {
            send(
                &mut to_host,
                json!({
                    "type": "PAGE_CONTENT",
                    "requestId": 1,
                    "data": {"url": "https://tokio.test", "title": "Tokio", "text": ARTICLE}
                }),
            )
            .await;
            let saved = receive(&mut from_host).await;
            assert_eq!(saved["requestId"], 1);
            assert_eq!(saved["success"], true);
            assert_eq!(saved["relatedPages"], 0);

            send(&mut to_host, json!({"type": "SEARCH_PAGES", "query": "tokoi", "requestId": 2})).await;
            let found = receive(&mut from_host).await;
            assert_eq!(found["requestId"], 2);
            assert_eq!(found["results"][0]["url"], "https://tokio.test");

            send(&mut to_host, json!({"type": "GET_STATS"})).await;
            let stats = receive(&mut from_host).await;
            assert_eq!(stats["stats"]["totalPages"], 1);
            assert!(stats.get("requestId").is_none());

            send(&mut to_host, json!({"type": "NOPE", "requestId": 3})).await;
            let failed = receive(&mut from_host).await;
            assert_eq!(failed["requestId"], 3);
            assert_eq!(failed["success"], false);

            drop(to_host);
            assert!(read_message(&mut from_host).await.unwrap().is_none());
        };

        let (served, ()) = tokio::join!(serve(&mut app, host_in, host_out), client);
        served.unwrap();
    }

    #[tokio::test]
    async fn waits_for_ingestion_after_input_closes() {
        let mut app = app().await;
        let (mut to_host, host_in) = duplex(64 * 1024);
        let (host_out, mut from_host) = duplex(64 * 1024);

        send(
            &mut to_host,
            json!({
                "type": "PAGE_CONTENT",
                "requestId": "last",
                "data": {"url": "https://tokio.test", "title": "Tokio", "text": ARTICLE}
            }),
        )
        .await;
        drop(to_host);

        serve(&mut app, host_in, host_out).await.unwrap();

        let saved = receive(&mut from_host).await;
        assert_eq!(saved["requestId"], "last");
        assert_eq!(saved["success"], true);
        assert_eq!(app.search("tokio").len(), 1);
    }

    #[test]
    fn oversized_listing_drops_page_text() {
        let page = Page {
            id: 1,
            url: "https://big.test".into(),
            title: "Big".into(),
            summary: String::new(),
            tags: vec![],
            full_text: "x".repeat(MAX_OUTGOING),
            timestamp: chrono::Utc::now(),
            favicon: None,
        };
        let reply = Outgoing::new(None, Response::Pages { results: vec![page] });

        let payload = encode(reply).unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["results"][0]["fullText"], "");
        assert_eq!(value["results"][0]["title"], "Big");
    }
}
