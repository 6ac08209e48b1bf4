//! SQLite-backed local store.
//!
//! One table per collection, `{ id, payload, updated_at }`, payloads as JSON
//! text and timestamps as fixed-width RFC 3339 text, so no precision is lost
//! against the payload's own `updated_at`. Singleton sources use a fixed
//! one-row table. Metadata probes read only `id` and `updated_at`, never the
//! payload column. All stores opened from one [`LocalDatabase`] share a
//! single connection behind a mutex; blocking calls run on the blocking
//! thread pool.

use crate::error::{SyncError, SyncResult};
use crate::source::{LocalCollectionSource, LocalSingleSource, decode_conflict};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use studyplan_types::{DocumentId, MetadataModel, SourceSyncKey, SyncedDocument};

/// Shared handle to the embedded database file.
#[derive(Clone)]
pub struct LocalDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl LocalDatabase {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SyncError::Storage(format!("failed to open local database: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::Storage(format!("failed to open in-memory database: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates (if needed) and returns the collection store for a source key.
    pub fn collection<T: SyncedDocument>(
        &self,
        key: SourceSyncKey,
    ) -> SyncResult<SqliteCollectionStore<T>> {
        let table = table_name(key)?;
        {
            let conn = self.conn.lock().unwrap();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );"
            ))
            .map_err(|e| SyncError::Storage(format!("failed to init table {table}: {e}")))?;
        }
        Ok(SqliteCollectionStore {
            conn: self.conn.clone(),
            table,
            _marker: PhantomData,
        })
    }

    /// Creates (if needed) and returns the singleton store for a source key.
    pub fn single<T: SyncedDocument>(&self, key: SourceSyncKey) -> SyncResult<SqliteSingleStore<T>> {
        let table = table_name(key)?;
        {
            let conn = self.conn.lock().unwrap();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    slot INTEGER PRIMARY KEY CHECK (slot = 0),
                    id TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );"
            ))
            .map_err(|e| SyncError::Storage(format!("failed to init table {table}: {e}")))?;
        }
        Ok(SqliteSingleStore {
            conn: self.conn.clone(),
            table,
            _marker: PhantomData,
        })
    }
}

/// Source keys double as table names, so anything but a plain identifier
/// is rejected before it reaches interpolated SQL.
fn table_name(key: SourceSyncKey) -> SyncResult<String> {
    let name = key.as_str();
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        Ok(name.to_string())
    } else {
        Err(SyncError::Storage(format!(
            "source key {name:?} is not usable as a table name"
        )))
    }
}

async fn run_blocking<F, R>(conn: &Arc<Mutex<Connection>>, f: F) -> SyncResult<R>
where
    F: FnOnce(&Connection) -> SyncResult<R> + Send + 'static,
    R: Send + 'static,
{
    let conn = conn.clone();
    tokio::task::spawn_blocking(move || {
        let conn = conn.lock().unwrap();
        f(&conn)
    })
    .await
    .map_err(|e| SyncError::Storage(format!("blocking task failed: {e}")))?
}

fn storage_err(context: &str, e: rusqlite::Error) -> SyncError {
    SyncError::Storage(format!("{context}: {e}"))
}

/// Encodes a timestamp for the `updated_at` column. Fixed-width RFC 3339
/// with nanoseconds, so SQLite's string comparison orders chronologically
/// and the stored value round-trips exactly.
fn encode_timestamp(updated_at: DateTime<Utc>) -> String {
    updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn row_metadata(id: &str, stamp: &str) -> SyncResult<MetadataModel> {
    let document_id = DocumentId::parse(id)
        .map_err(|e| SyncError::Storage(format!("invalid document id in store: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| SyncError::Storage(format!("invalid timestamp in store: {e}")))?
        .with_timezone(&Utc);
    Ok(MetadataModel::new(document_id, updated_at))
}

/// Local store for one keyed collection, backed by its own SQLite table.
#[derive(Debug)]
pub struct SqliteCollectionStore<T> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: SyncedDocument> LocalCollectionSource<T> for SqliteCollectionStore<T> {
    async fn add_or_update_item(&self, item: T) -> SyncResult<()> {
        let id = item.document_id().to_string();
        let updated_at = encode_timestamp(item.updated_at());
        let payload = serde_json::to_string(&item)?;
        // Stale writes lose silently: the WHERE clause keeps updated_at
        // monotonically non-decreasing under any write sequence.
        let sql = format!(
            "INSERT INTO {t} (id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = excluded.updated_at
             WHERE excluded.updated_at >= {t}.updated_at",
            t = self.table
        );
        run_blocking(&self.conn, move |conn| {
            conn.execute(&sql, params![id, payload, updated_at])
                .map_err(|e| storage_err("failed to upsert document", e))?;
            Ok(())
        })
        .await
    }

    async fn fetch_item(&self, id: DocumentId) -> SyncResult<Option<T>> {
        let sql = format!("SELECT payload FROM {} WHERE id = ?1", self.table);
        let id_str = id.to_string();
        let payload: Option<String> = run_blocking(&self.conn, move |conn| {
            conn.query_row(&sql, params![id_str], |row| row.get(0))
                .optional()
                .map_err(|e| storage_err("failed to fetch document", e))
        })
        .await?;

        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| decode_conflict("stored payload does not match expected shape", e)),
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> SyncResult<Vec<T>> {
        let sql = format!("SELECT payload FROM {}", self.table);
        let payloads: Vec<String> = run_blocking(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| storage_err("failed to prepare fetch", e))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| storage_err("failed to query documents", e))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| storage_err("failed to read row", e))?);
            }
            Ok(out)
        })
        .await?;

        payloads
            .iter()
            .map(|json| {
                serde_json::from_str(json)
                    .map_err(|e| decode_conflict("stored payload does not match expected shape", e))
            })
            .collect()
    }

    async fn fetch_metadata(&self, id: DocumentId) -> SyncResult<Option<MetadataModel>> {
        let sql = format!("SELECT id, updated_at FROM {} WHERE id = ?1", self.table);
        let id_str = id.to_string();
        let row: Option<(String, String)> = run_blocking(&self.conn, move |conn| {
            conn.query_row(&sql, params![id_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .map_err(|e| storage_err("failed to fetch metadata", e))
        })
        .await?;

        row.map(|(id, stamp)| row_metadata(&id, &stamp)).transpose()
    }

    async fn fetch_all_metadata(&self) -> SyncResult<Vec<MetadataModel>> {
        let sql = format!("SELECT id, updated_at FROM {}", self.table);
        let rows: Vec<(String, String)> = run_blocking(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| storage_err("failed to prepare metadata query", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| storage_err("failed to query metadata", e))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| storage_err("failed to read metadata row", e))?);
            }
            Ok(out)
        })
        .await?;

        rows.iter()
            .map(|(id, stamp)| row_metadata(id, stamp))
            .collect()
    }

    async fn delete_item(&self, id: DocumentId) -> SyncResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.table);
        let id_str = id.to_string();
        run_blocking(&self.conn, move |conn| {
            conn.execute(&sql, params![id_str])
                .map_err(|e| storage_err("failed to delete document", e))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> SyncResult<()> {
        let sql = format!("DELETE FROM {}", self.table);
        run_blocking(&self.conn, move |conn| {
            conn.execute(&sql, [])
                .map_err(|e| storage_err("failed to clear collection", e))?;
            Ok(())
        })
        .await
    }
}

/// Local store for one singleton document, backed by a fixed one-row table.
#[derive(Debug)]
pub struct SqliteSingleStore<T> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: SyncedDocument> LocalSingleSource<T> for SqliteSingleStore<T> {
    async fn add_or_update_item(&self, item: T) -> SyncResult<()> {
        let id = item.document_id().to_string();
        let updated_at = encode_timestamp(item.updated_at());
        let payload = serde_json::to_string(&item)?;
        let sql = format!(
            "INSERT INTO {t} (slot, id, payload, updated_at) VALUES (0, ?1, ?2, ?3)
             ON CONFLICT(slot) DO UPDATE SET
                 id = excluded.id,
                 payload = excluded.payload,
                 updated_at = excluded.updated_at
             WHERE excluded.updated_at >= {t}.updated_at",
            t = self.table
        );
        run_blocking(&self.conn, move |conn| {
            conn.execute(&sql, params![id, payload, updated_at])
                .map_err(|e| storage_err("failed to upsert document", e))?;
            Ok(())
        })
        .await
    }

    async fn fetch_item(&self) -> SyncResult<Option<T>> {
        let sql = format!("SELECT payload FROM {} WHERE slot = 0", self.table);
        let payload: Option<String> = run_blocking(&self.conn, move |conn| {
            conn.query_row(&sql, [], |row| row.get(0))
                .optional()
                .map_err(|e| storage_err("failed to fetch document", e))
        })
        .await?;

        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| decode_conflict("stored payload does not match expected shape", e)),
            None => Ok(None),
        }
    }

    async fn fetch_metadata(&self) -> SyncResult<Option<MetadataModel>> {
        let sql = format!("SELECT id, updated_at FROM {} WHERE slot = 0", self.table);
        let row: Option<(String, String)> = run_blocking(&self.conn, move |conn| {
            conn.query_row(&sql, [], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .map_err(|e| storage_err("failed to fetch metadata", e))
        })
        .await?;

        row.map(|(id, stamp)| row_metadata(&id, &stamp)).transpose()
    }

    async fn delete_item(&self) -> SyncResult<()> {
        let sql = format!("DELETE FROM {} WHERE slot = 0", self.table);
        run_blocking(&self.conn, move |conn| {
            conn.execute(&sql, [])
                .map_err(|e| storage_err("failed to delete document", e))?;
            Ok(())
        })
        .await
    }
}
