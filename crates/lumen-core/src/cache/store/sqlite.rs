//! SQLite blob store.
//!
//! All objects live in one table. rusqlite is synchronous, so each call
//! hops onto the blocking pool and locks the shared connection there.

use super::traits::BlobStore;
use crate::error::{LumenError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// SQLite-based blob store backend.
///
/// Thread-safe via internal mutex on the connection.
#[derive(Clone)]
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBlobStore {
    /// Open (or create) a store at the specified database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LumenError::Io {
                message: format!("Failed to create blob store directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| LumenError::Database {
            message: format!("Failed to open blob database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| LumenError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Create a store backed by an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| LumenError::Database {
            message: format!("Failed to open in-memory database: {}", e),
            source: Some(e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                path TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| LumenError::Database {
            message: format!("Failed to initialize blob schema: {}", e),
            source: Some(e),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| LumenError::Database {
                message: format!("Failed to lock database: {}", e),
                source: None,
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| LumenError::Database {
            message: format!("Blob store task failed: {}", e),
            source: None,
        })?
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn check_connection(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| LumenError::CacheUnavailable {
                    message: format!("SQLite probe failed: {}", e),
                })?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM blobs WHERE path = ?1", params![path], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn download_text(&self, path: &str) -> Result<Option<String>> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let content = conn
                .query_row(
                    "SELECT content FROM blobs WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| LumenError::Database {
                    message: format!("Failed to read blob {}: {}", path, e),
                    source: Some(e),
                })?;
            Ok(content)
        })
        .await
    }

    async fn upload_text(&self, path: &str, content: &str) -> Result<()> {
        let path = path.to_string();
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO blobs (path, content, size_bytes, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![path, content, content.len() as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| LumenError::Database {
                message: format!("Failed to write blob {}: {}", path, e),
                source: Some(e),
            })?;
            debug!("Stored blob {} ({} bytes)", path, content.len());
            Ok(())
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT path FROM blobs WHERE substr(path, 1, ?2) = ?1 ORDER BY path")?;
            let rows = stmt.query_map(params![prefix, prefix.chars().count() as i64], |row| {
                row.get::<_, String>(0)
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }
}
