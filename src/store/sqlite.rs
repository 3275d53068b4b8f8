// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based storage for incident reports and their embedding vectors.
//!
//! Vectors are written as little-endian f32 blobs. Rows written by older
//! tooling may carry the vector as JSON text (`[0.1, 0.2, ...]`); both forms
//! decode to `Vec<f32>` here so callers never parse embeddings themselves.

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{
    check_vector, is_usable, new_record_id, now_millis, NewRecord, Record, RecordStore,
    VectorCoverage,
};
use crate::errors::{Error, Result};

/// Directory holding the default database, relative to the working root.
pub const STORE_DIR: &str = ".priorcase";
pub const STORE_FILE: &str = "reports.sqlite";

const SCHEMA_VERSION: &str = "1";

const RECORD_COLUMNS: &str =
    "id, text, narrative, embedding, created_at, origin, external_ref";

/// Rows whose `embedding` cannot be a usable f32 blob of dimension `?2`.
/// Legacy JSON text passes this filter and is decoded before the final check.
const NEEDS_VECTOR: &str = r#"
    (embedding IS NULL
     OR typeof(embedding) != 'blob'
     OR length(embedding) % 4 != 0
     OR (?2 IS NOT NULL AND length(embedding) != ?2 * 4)
     OR embedding = zeroblob(length(embedding)))
"#;

/// SQLite-backed [`RecordStore`].
///
/// Owns its connection for the lifetime of the store.
pub struct SqliteRecordStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteRecordStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens the store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(STORE_DIR).join(STORE_FILE))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the database file (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                narrative TEXT,
                embedding,
                created_at INTEGER NOT NULL,
                origin TEXT,
                external_ref TEXT UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_reports_created_at
                ON reports(created_at DESC);

            CREATE INDEX IF NOT EXISTS idx_reports_origin
                ON reports(origin, created_at DESC);
            "#,
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Counts all records.
    pub fn count_records(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Validates `vector` and returns whether it is the first one stored.
    fn check_dimension(&self, vector: &[f32]) -> Result<bool> {
        let dimension = self.dimension()?;
        check_vector(vector, dimension)?;
        Ok(dimension.is_none())
    }

    fn record_dimension(&self, len: usize) -> Result<()> {
        self.set_meta("dimension", &len.to_string())
    }

    fn read_record(row: &Row<'_>) -> rusqlite::Result<Record> {
        let id: String = row.get(0)?;
        let vector = match decode_vector(row.get_ref(3)?) {
            Ok(vector) => vector,
            Err(reason) => {
                warn!(
                    "{}",
                    Error::MalformedVector {
                        id: id.clone(),
                        reason
                    }
                );
                None
            }
        };

        Ok(Record {
            id,
            text: row.get(1)?,
            narrative: row.get(2)?,
            vector,
            created_at: row.get(4)?,
            origin: row.get(5)?,
            external_ref: row.get(6)?,
        })
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

/// Decodes the `embedding` column: f32 blob, JSON text, or NULL.
fn decode_vector(value: ValueRef<'_>) -> std::result::Result<Option<Vec<f32>>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            if blob.len() % 4 != 0 {
                return Err(format!("blob length {} is not a multiple of 4", blob.len()));
            }
            Ok(Some(
                blob.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ))
        }
        ValueRef::Text(text) => {
            let text = std::str::from_utf8(text).map_err(|e| e.to_string())?;
            serde_json::from_str::<Vec<f32>>(text.trim())
                .map(Some)
                .map_err(|e| format!("unparseable vector text: {}", e))
        }
        ValueRef::Integer(_) | ValueRef::Real(_) => {
            Err("scalar value where a vector was expected".to_string())
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn list_candidates(
        &self,
        scope: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM reports
            WHERE embedding IS NOT NULL
              AND (?1 IS NULL OR origin = ?1)
              AND (?2 IS NULL OR id != ?2)
            ORDER BY created_at DESC, id ASC
            LIMIT ?3
            "#
        ))?;

        let records = stmt
            .query_map(params![scope, exclude_id, limit as i64], Self::read_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get_record(&self, id: &str) -> Result<Record> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM reports WHERE id = ?1"))?;

        stmt.query_row(params![id], Self::read_record)
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn insert_record(&mut self, record: NewRecord) -> Result<String> {
        let first_vector = match record.vector.as_deref() {
            Some(vector) => self.check_dimension(vector)?,
            None => false,
        };

        let id = new_record_id();
        let blob = record.vector.as_deref().map(Self::embedding_to_blob);
        self.conn.execute(
            r#"
            INSERT INTO reports (id, text, narrative, embedding, created_at, origin, external_ref)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id,
                record.text,
                record.narrative,
                blob,
                now_millis(),
                record.origin,
                record.external_ref
            ],
        )?;

        if let (true, Some(vector)) = (first_vector, record.vector.as_deref()) {
            self.record_dimension(vector.len())?;
        }
        Ok(id)
    }

    fn attach_vector(&mut self, id: &str, vector: &[f32]) -> Result<bool> {
        let current = self.get_record(id)?;
        let first_vector = self.check_dimension(vector)?;
        if is_usable(current.vector.as_deref(), self.dimension()?) {
            return Ok(false);
        }
        if current.vector.is_some() {
            info!("Replacing unusable vector on record {}", id);
        }

        self.conn.execute(
            "UPDATE reports SET embedding = ?1 WHERE id = ?2",
            params![Self::embedding_to_blob(vector), id],
        )?;
        if first_vector {
            self.record_dimension(vector.len())?;
        }
        Ok(true)
    }

    fn set_narrative(&mut self, id: &str, narrative: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE reports SET narrative = ?1 WHERE id = ?2",
            params![narrative, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn records_missing_vector(&self, scope: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let dimension = self.dimension()?;
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM reports
            WHERE (?1 IS NULL OR origin = ?1)
              AND {NEEDS_VECTOR}
            ORDER BY created_at DESC, id ASC
            "#
        ))?;

        let rows = stmt.query_map(
            params![scope, dimension.map(|d| d as i64)],
            Self::read_record,
        )?;
        let mut records = Vec::new();
        for record in rows {
            let record = record?;
            if !is_usable(record.vector.as_deref(), dimension) {
                records.push(record);
                if records.len() >= limit {
                    break;
                }
            }
        }
        Ok(records)
    }

    fn coverage(&self, scope: Option<&str>) -> Result<VectorCoverage> {
        let (total, with_payload): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(embedding) FROM reports WHERE (?1 IS NULL OR origin = ?1)",
            params![scope],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let dimension = self.dimension()?;
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT id, embedding
            FROM reports
            WHERE (?1 IS NULL OR origin = ?1)
              AND embedding IS NOT NULL
              AND {NEEDS_VECTOR}
            "#
        ))?;
        let mut rows = stmt.query(params![scope, dimension.map(|d| d as i64)])?;
        let mut malformed = 0u64;
        while let Some(row) = rows.next()? {
            let vector = decode_vector(row.get_ref(1)?).ok().flatten();
            if !is_usable(vector.as_deref(), dimension) {
                malformed += 1;
            }
        }

        let with_vector = with_payload as u64 - malformed;
        Ok(VectorCoverage {
            total: total as u64,
            with_vector,
            missing: total as u64 - with_vector,
            malformed,
        })
    }

    fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM reports WHERE external_ref = ?1",
                params![external_ref],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn dimension(&self) -> Result<Option<usize>> {
        Ok(self
            .get_meta("dimension")?
            .and_then(|value| value.parse::<usize>().ok()))
    }
}
