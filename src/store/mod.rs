// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record store - persistence for incident reports and their embeddings
//!
//! The ranking core only sees the [`RecordStore`] trait. Vectors always come
//! out of a store as typed `Vec<f32>`, whatever their on-disk encoding.

pub mod memory;
pub mod sqlite;

use serde::Serialize;

use crate::errors::Result;
use crate::similarity::is_zero_vector;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Scope tag for reports submitted directly.
pub const ORIGIN_INTERNAL: &str = "internal";
/// Scope tag for reports brought in by batch import.
pub const ORIGIN_IMPORTED: &str = "imported";

/// A stored incident report.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// Unique, immutable identifier
    pub id: String,
    /// Full source document text
    pub text: String,
    /// Derived analysis text, if any
    pub narrative: Option<String>,
    /// Embedding of `text`; `None` while pending backfill
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Scope tag (e.g. "internal", "imported")
    pub origin: Option<String>,
    /// Reference in the source system for imported reports
    pub external_ref: Option<String>,
}

/// Input for [`RecordStore::insert_record`].
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub text: String,
    pub narrative: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub origin: Option<String>,
    pub external_ref: Option<String>,
}

impl NewRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = Some(narrative.into());
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }
}

/// Embedding coverage of a (scoped) corpus.
///
/// `missing` counts every record backfill would pick up; `malformed` is the
/// share of those holding a payload that cannot be used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VectorCoverage {
    pub total: u64,
    pub with_vector: u64,
    pub missing: u64,
    pub malformed: u64,
}

/// Persistence capability used by the ranking core, import and backfill.
pub trait RecordStore {
    /// Records with a vector, newest first, optionally restricted to an origin
    /// and excluding one id.
    fn list_candidates(
        &self,
        scope: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Fetches a record, failing with `NotFound` for unknown ids.
    fn get_record(&self, id: &str) -> Result<Record>;

    /// Inserts a record and returns its new id.
    fn insert_record(&mut self, record: NewRecord) -> Result<String>;

    /// Fills a missing vector. Records that already have a usable one are
    /// left alone, unreadable payloads are replaced; returns whether the
    /// vector was written.
    fn attach_vector(&mut self, id: &str, vector: &[f32]) -> Result<bool>;

    /// Replaces the analysis text. The embedding is unaffected.
    fn set_narrative(&mut self, id: &str, narrative: &str) -> Result<()>;

    /// Records without a usable vector, newest first. Includes records whose
    /// stored payload is malformed or does not fit the corpus dimension.
    fn records_missing_vector(&self, scope: Option<&str>, limit: usize) -> Result<Vec<Record>>;

    fn coverage(&self, scope: Option<&str>) -> Result<VectorCoverage>;

    /// Id of the record imported under `external_ref`, if any.
    fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<String>>;

    /// Dimensionality shared by every stored vector, once one exists.
    fn dimension(&self) -> Result<Option<usize>>;
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a vector against the store's dimension before it is written.
pub(crate) fn check_vector(vector: &[f32], dimension: Option<usize>) -> Result<()> {
    use crate::errors::Error;

    if vector.is_empty() {
        return Err(Error::InvalidInput("cannot store an empty vector".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "cannot store a vector with non-finite components".to_string(),
        ));
    }
    if is_zero_vector(vector) {
        return Err(Error::InvalidInput("cannot store a zero vector".to_string()));
    }
    if let Some(expected) = dimension {
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
    }
    Ok(())
}

/// Whether a stored vector can take part in ranking.
pub(crate) fn is_usable(vector: Option<&[f32]>, dimension: Option<usize>) -> bool {
    vector.is_some_and(|v| check_vector(v, dimension).is_ok())
}
