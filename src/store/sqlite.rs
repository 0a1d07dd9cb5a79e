//! SQLite-backed artifact store.
//!
//! - One file (or in-memory database) holding sources and queries
//! - Connection configs are sealed with AES-256-GCM before they are written
//! - Versioned: a version mismatch drops and recreates the tables

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info};

use super::{ArtifactStore, DataSourceRecord, QueryRecord, StoreError, StoreResult};
use crate::config::ConnectionConfig;
use crate::crypto::Sealer;
use crate::schema::NormalizedSchema;

/// Current store schema version. Bump this when the table layout changes.
const STORE_VERSION: i32 = 1;

const TABLES: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS data_sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        config_sealed TEXT NOT NULL,
        schema_json TEXT,
        schema_hash TEXT,
        semantic_layer TEXT,
        last_analyzed_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS queries (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        description TEXT NOT NULL,
        raw_query TEXT,
        updated_at INTEGER NOT NULL
    );
";

/// [`ArtifactStore`] on rusqlite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    sealer: Sealer,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>, sealer: Sealer) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
            sealer,
        };
        store.init()?;
        info!(path = %path.display(), "artifact store opened");
        Ok(store)
    }

    /// Open an in-memory store.
    pub fn open_in_memory(sealer: Sealer) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            sealer,
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Corrupt("store lock poisoned".into()))
    }

    fn init(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(TABLES)?;

        let stored_version: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                row.get(0)
            })
            .optional()?;

        match stored_version.and_then(|v| v.parse::<i32>().ok()) {
            Some(v) if v == STORE_VERSION => {}
            Some(v) => {
                info!(from = v, to = STORE_VERSION, "store version changed, recreating tables");
                conn.execute_batch("DROP TABLE data_sources; DROP TABLE queries;")?;
                conn.execute_batch(TABLES)?;
                set_version(&conn)?;
            }
            None => set_version(&conn)?,
        }
        Ok(())
    }

    fn source_from_row(&self, row: &Row<'_>) -> StoreResult<DataSourceRecord> {
        let kind: String = row.get("kind")?;
        let config_sealed: String = row.get("config_sealed")?;
        let schema_json: Option<String> = row.get("schema_json")?;
        let semantic_layer: Option<String> = row.get("semantic_layer")?;

        let config: ConnectionConfig =
            serde_json::from_str(&self.sealer.open(&config_sealed)?)?;
        let schema: Option<NormalizedSchema> =
            schema_json.as_deref().map(serde_json::from_str).transpose()?;
        let semantic_layer: Option<Value> =
            semantic_layer.as_deref().map(serde_json::from_str).transpose()?;

        Ok(DataSourceRecord {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: kind
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("unknown backend kind '{}'", kind)))?,
            config,
            schema,
            semantic_layer,
            last_analyzed_at: row.get("last_analyzed_at")?,
        })
    }
}

fn set_version(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
        params![STORE_VERSION.to_string()],
    )?;
    Ok(())
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn load_source(&self, id: &str) -> StoreResult<Option<DataSourceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, config_sealed, schema_json, semantic_layer, last_analyzed_at
             FROM data_sources WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id])?;
        let record = match rows.next()? {
            Some(row) => Some(self.source_from_row(row)?),
            None => None,
        };
        Ok(record)
    }

    async fn save_source(&self, record: &DataSourceRecord) -> StoreResult<()> {
        let config_sealed = self.sealer.seal(&serde_json::to_string(&record.config)?)?;
        let schema_json = record.schema.as_ref().map(serde_json::to_string).transpose()?;
        let schema_hash = record.schema.as_ref().map(|s| s.fingerprint()).transpose()?;
        let semantic_layer = record
            .semantic_layer
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn()?.execute(
            "INSERT OR REPLACE INTO data_sources
             (id, name, kind, config_sealed, schema_json, schema_hash, semantic_layer, last_analyzed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.name,
                record.kind.as_str(),
                config_sealed,
                schema_json,
                schema_hash,
                semantic_layer,
                record.last_analyzed_at,
            ],
        )?;
        debug!(source = %record.id, kind = %record.kind, "source saved");
        Ok(())
    }

    async fn save_analysis(
        &self,
        source_id: &str,
        schema: &NormalizedSchema,
        analyzed_at: i64,
    ) -> StoreResult<()> {
        let schema_json = serde_json::to_string(schema)?;
        let schema_hash = schema.fingerprint()?;

        let rows = self.conn()?.execute(
            "UPDATE data_sources
             SET schema_json = ?, schema_hash = ?, last_analyzed_at = ?
             WHERE id = ?",
            params![schema_json, schema_hash, analyzed_at, source_id],
        )?;
        if rows == 0 {
            return Err(not_found("data source", source_id));
        }
        debug!(source = source_id, hash = %schema_hash, "analysis saved");
        Ok(())
    }

    async fn load_query(&self, id: &str) -> StoreResult<Option<QueryRecord>> {
        let record = self
            .conn()?
            .query_row(
                "SELECT id, source_id, description, raw_query FROM queries WHERE id = ?",
                params![id],
                |row| {
                    Ok(QueryRecord {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        description: row.get(2)?,
                        raw_query: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn save_query(&self, record: &QueryRecord) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO queries (id, source_id, description, raw_query, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.id,
                record.source_id,
                record.description,
                record.raw_query,
                now_epoch(),
            ],
        )?;
        Ok(())
    }

    async fn save_artifact(
        &self,
        query_id: &str,
        description: &str,
        artifact: &str,
    ) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE queries SET description = ?, raw_query = ?, updated_at = ? WHERE id = ?",
            params![description, artifact, now_epoch(), query_id],
        )?;
        if rows == 0 {
            return Err(not_found("query", query_id));
        }
        debug!(query = query_id, "artifact saved");
        Ok(())
    }
}
