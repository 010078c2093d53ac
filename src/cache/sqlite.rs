// SqliteCache: rusqlite backend for the resolution cache.
//
// One database file per namespace (e.g. cache/tracks.db, cache/artists.db).
// The Connection sits behind a tokio Mutex because it is !Sync; every method
// locks, does its synchronous rusqlite work, and returns. The Option lets
// `close` take the connection out exactly once.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::ResolutionCache;

pub struct SqliteCache {
    conn: Mutex<Option<Connection>>,
    label: String,
}

/// Create the cache table if it doesn't exist yet. Idempotent.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS resolved_entities (
            id TEXT PRIMARY KEY,
            value TEXT NOT NULL,          -- JSON-encoded cache entry
            cached_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
    .context("Failed to create cache tables")?;
    Ok(())
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        create_tables(&conn)?;

        Ok(Self::from_connection(conn, &path.display().to_string()))
    }

    /// Wrap an already-opened connection (tests use `open_in_memory`).
    pub fn from_connection(conn: Connection, label: &str) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            label: label.to_string(),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self::from_connection(conn, ":memory:"))
    }
}

fn open_conn<'a>(conn: &'a mut Option<Connection>, label: &str) -> Result<&'a mut Connection> {
    conn.as_mut()
        .ok_or_else(|| anyhow::anyhow!("Resolution cache {label} is closed"))
}

#[async_trait]
impl ResolutionCache for SqliteCache {
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let mut guard = self.conn.lock().await;
        let conn = open_conn(&mut guard, &self.label)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM resolved_entities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).with_context(|| format!("Corrupt cache entry {id}"))?,
            )),
            None => Ok(None),
        }
    }

    async fn batch_put(&self, entries: BTreeMap<String, serde_json::Value>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut guard = self.conn.lock().await;
        let conn = open_conn(&mut guard, &self.label)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO resolved_entities (id, value, cached_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(id) DO UPDATE SET value = ?2, cached_at = datetime('now')",
            )?;
            for (id, value) in &entries {
                stmt.execute(params![id, serde_json::to_string(value)?])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit cache batch to {}", self.label))?;
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        let mut guard = self.conn.lock().await;
        let conn = open_conn(&mut guard, &self.label)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM resolved_entities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .take()
            .ok_or_else(|| anyhow::anyhow!("Resolution cache {} already closed", self.label))?;
        conn.close()
            .map_err(|(_, e)| anyhow::anyhow!("Failed to close cache {}: {e}", self.label))
    }
}
