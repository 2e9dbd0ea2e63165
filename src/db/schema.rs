use rusqlite::Connection;

/// Ordered schema migrations. Entry `n` upgrades `user_version` from `n` to `n + 1`.
pub const MIGRATIONS: &[&str] = &[SCHEMA_V1];

const SCHEMA_V1: &str = r#"
-- pages table
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    full_text TEXT NOT NULL DEFAULT '',
    timestamp INTEGER NOT NULL,
    favicon TEXT
);

CREATE INDEX IF NOT EXISTS idx_pages_timestamp ON pages(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_pages_title ON pages(title);

-- page_tags table (one row per tag occurrence, the multi-value tag index)
CREATE TABLE IF NOT EXISTS page_tags (
    page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY(page_id, position)
);

CREATE INDEX IF NOT EXISTS idx_page_tags_tag ON page_tags(tag);
"#;

/// Bring the database up to the latest schema version, one migration per transaction.
pub fn migrate(conn: &mut Connection) -> std::result::Result<(), tokio_rusqlite::Error> {
    conn.pragma_update(None, "foreign_keys", true)?;

    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = usize::try_from(current).unwrap_or(0);

    if current > MIGRATIONS.len() {
        return Err(tokio_rusqlite::Error::Other(
            format!(
                "database schema version {} is newer than supported version {}",
                current,
                MIGRATIONS.len()
            )
            .into(),
        ));
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index as i64 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!("Migrated page store schema to version {}", version);
    }

    Ok(())
}
