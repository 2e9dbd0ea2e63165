use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{NewPage, Page, StoreStats};

use super::schema::migrate;

const PAGE_COLUMNS: &str = "id, url, title, summary, tags, full_text, timestamp, favicon";

/// SQLite-backed page store. Every call runs on the connection's own thread,
/// so each closure below executes atomically with respect to the others.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| migrate(conn)).await?;
        Ok(Self { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }

    /// Insert a page, or replace the fields of the page already stored under
    /// the same URL. Returns the page id, which never changes for a URL.
    pub async fn upsert_page(&self, page: NewPage) -> Result<i64> {
        let tags_json = serde_json::to_string(&page.tags)?;
        let now = Utc::now().timestamp_millis();

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                // The page written last is always strictly the newest
                let newest: Option<i64> =
                    tx.query_row("SELECT MAX(timestamp) FROM pages", [], |row| row.get(0))?;
                let timestamp = match newest {
                    Some(newest) if newest >= now => newest + 1,
                    _ => now,
                };

                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM pages WHERE url = ?1",
                        params![page.url],
                        |row| row.get(0),
                    )
                    .optional()?;

                let id = match existing {
                    Some(id) => {
                        tx.execute(
                            r#"UPDATE pages SET
                                   title = ?2,
                                   summary = ?3,
                                   tags = ?4,
                                   full_text = ?5,
                                   timestamp = ?6,
                                   favicon = ?7
                               WHERE id = ?1"#,
                            params![
                                id,
                                page.title,
                                page.summary,
                                tags_json,
                                page.full_text,
                                timestamp,
                                page.favicon,
                            ],
                        )?;
                        id
                    }
                    None => {
                        tx.execute(
                            r#"INSERT INTO pages (url, title, summary, tags, full_text, timestamp, favicon)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                            params![
                                page.url,
                                page.title,
                                page.summary,
                                tags_json,
                                page.full_text,
                                timestamp,
                                page.favicon,
                            ],
                        )?;
                        tx.last_insert_rowid()
                    }
                };

                write_tag_index(&tx, id, &page.tags)?;
                tx.commit()?;
                Ok(id)
            })
            .await?;

        tracing::debug!("Upserted page {}", id);
        Ok(id)
    }

    /// Replace the summary and tags of page `id`, but only while its stored
    /// text is still `analyzed_text`. Returns `false` when the page is gone
    /// or was saved again with other text. Timestamp and other fields are
    /// left alone.
    pub async fn update_analysis(
        &self,
        id: i64,
        analyzed_text: String,
        summary: String,
        tags: Vec<String>,
    ) -> Result<bool> {
        let tags_json = serde_json::to_string(&tags)?;

        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE pages SET summary = ?2, tags = ?3 WHERE id = ?1 AND full_text = ?4",
                    params![id, summary, tags_json, analyzed_text],
                )?;
                if changed == 0 {
                    return Ok(false);
                }

                write_tag_index(&tx, id, &tags)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(updated)
    }

    /// All pages in store order (ascending id).
    pub async fn get_all_pages(&self) -> Result<Vec<Page>> {
        let pages = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM pages ORDER BY id", PAGE_COLUMNS))?;
                let pages = stmt
                    .query_map([], page_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(pages)
            })
            .await?;
        Ok(pages)
    }

    pub async fn get_page(&self, id: i64) -> Result<Option<Page>> {
        let page = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS))?;
                let page = stmt.query_row(params![id], page_from_row).optional()?;
                Ok(page)
            })
            .await?;
        Ok(page)
    }

    /// Pages carrying exactly `tag` (case-sensitive, via the tag index).
    pub async fn get_pages_by_tag(&self, tag: &str) -> Result<Vec<Page>> {
        let tag = tag.to_string();
        let pages = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT p.id, p.url, p.title, p.summary, p.tags, p.full_text, p.timestamp, p.favicon
                       FROM pages p
                       WHERE p.id IN (SELECT page_id FROM page_tags WHERE tag = ?1)
                       ORDER BY p.id"#,
                )?;
                let pages = stmt
                    .query_map(params![tag], page_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(pages)
            })
            .await?;
        Ok(pages)
    }

    /// Delete a page. Returns whether it existed; a missing id is not an error.
    pub async fn delete_page(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                // Delete tag rows first
                tx.execute("DELETE FROM page_tags WHERE page_id = ?1", params![id])?;
                let deleted = tx.execute("DELETE FROM pages WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM page_tags", [])?;
                tx.execute("DELETE FROM pages", [])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let stats = self
            .conn
            .call(|conn| {
                let (total, oldest, newest): (i64, Option<i64>, Option<i64>) = conn.query_row(
                    "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM pages",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                let tags: i64 =
                    conn.query_row("SELECT COUNT(DISTINCT tag) FROM page_tags", [], |row| {
                        row.get(0)
                    })?;

                Ok(StoreStats {
                    total_pages: total as usize,
                    total_tags: tags as usize,
                    oldest_entry: oldest.and_then(DateTime::<Utc>::from_timestamp_millis),
                    newest_entry: newest.and_then(DateTime::<Utc>::from_timestamp_millis),
                })
            })
            .await?;
        Ok(stats)
    }
}

fn write_tag_index(tx: &Transaction, id: i64, tags: &[String]) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM page_tags WHERE page_id = ?1", params![id])?;
    let mut stmt =
        tx.prepare("INSERT INTO page_tags (page_id, position, tag) VALUES (?1, ?2, ?3)")?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![id, position as i64, tag])?;
    }
    Ok(())
}

fn page_from_row(row: &Row) -> rusqlite::Result<Page> {
    let tags_json: String = row.get(4)?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let millis: i64 = row.get(6)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, millis))?;

    Ok(Page {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        tags,
        full_text: row.get(5)?,
        timestamp,
        favicon: row.get(7)?,
    })
}
