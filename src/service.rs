// SPDX-License-Identifier: MIT OR Apache-2.0

//! Case service - submission and lookup of similar prior reports
//!
//! Ties an embedding provider, a record store and the ranking core together.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::{create_provider, embed_with_retry, EmbeddingProvider, RetryPolicy};
use crate::errors::{Error, Result};
use crate::ranker::{RankingConfig, SimilarCase, SimilarityFinder, SimilarityQuery};
use crate::store::{NewRecord, Record, RecordStore, SqliteRecordStore};

/// Per-call overrides of the configured ranking parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions<'a> {
    pub scope: Option<&'a str>,
    pub floor: Option<f32>,
    pub max_results: Option<usize>,
}

/// Outcome of [`CaseService::submit`].
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: String,
    pub similar: Vec<SimilarCase>,
}

pub struct CaseService<S> {
    finder: SimilarityFinder<S>,
    provider: Box<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl CaseService<SqliteRecordStore> {
    /// Opens the configured SQLite store relative to `root`.
    pub fn open(config: &Config, root: &Path) -> Result<Self> {
        Self::open_with_ranking(config, root, config.ranking.to_ranking_config())
    }

    /// Like [`CaseService::open`], with explicit ranking parameters.
    pub fn open_with_ranking(config: &Config, root: &Path, ranking: RankingConfig) -> Result<Self> {
        let store = SqliteRecordStore::open(config.store.path(root))?;
        let provider = create_provider(config.embeddings())?;
        let finder = SimilarityFinder::new(store, ranking, config.explanations.builder());
        Ok(Self::new(
            finder,
            provider,
            config.embeddings().retry_policy(),
        ))
    }
}

impl<S: RecordStore> CaseService<S> {
    pub fn new(
        finder: SimilarityFinder<S>,
        provider: Box<dyn EmbeddingProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            finder,
            provider,
            retry,
        }
    }

    pub fn store(&self) -> &S {
        self.finder.store()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.finder.store_mut()
    }

    /// Provider and store together, for batch jobs.
    pub fn parts_mut(&mut self) -> (&mut dyn EmbeddingProvider, &mut S, &RetryPolicy) {
        (
            self.provider.as_mut(),
            self.finder.store_mut(),
            &self.retry,
        )
    }

    pub fn into_store(self) -> S {
        self.finder.into_store()
    }

    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let expected = self.finder.store().dimension()?;
        embed_with_retry(self.provider.as_mut(), text, &self.retry, expected).map_err(|err| {
            match err {
                Error::InvalidInput(reason) => {
                    Error::InvalidInput(format!("cannot embed report: {}", reason))
                }
                other => other,
            }
        })
    }

    /// Embeds a new report, ranks it against the corpus and stores it.
    ///
    /// Nothing is written when the embedding cannot be obtained. The new
    /// record is never among its own similar cases.
    pub fn submit(
        &mut self,
        text: &str,
        origin: Option<&str>,
        narrative: Option<&str>,
        options: QueryOptions<'_>,
    ) -> Result<Submission> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("report text is empty".to_string()));
        }

        let vector = self.embed(text)?;
        let similar = self.rank(text, &vector, None, options)?;

        let mut record = NewRecord::new(text).with_vector(vector);
        if let Some(origin) = origin {
            record = record.with_origin(origin);
        }
        if let Some(narrative) = narrative {
            record = record.with_narrative(narrative);
        }
        let id = self.finder.store_mut().insert_record(record)?;
        info!("Stored report {} with {} similar cases", id, similar.len());

        Ok(Submission { id, similar })
    }

    /// Ranks the corpus against a report without storing it.
    pub fn similar_to_text(
        &mut self,
        text: &str,
        options: QueryOptions<'_>,
    ) -> Result<Vec<SimilarCase>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("report text is empty".to_string()));
        }
        let vector = self.embed(text)?;
        self.rank(text, &vector, None, options)
    }

    /// Ranks the corpus against a stored report, excluding the report itself.
    ///
    /// Records still waiting for backfill are embedded on the fly; the stored
    /// row is left untouched. A stored vector that does not fit the corpus
    /// fails with `DimensionMismatch`.
    pub fn similar_to_record(
        &mut self,
        id: &str,
        options: QueryOptions<'_>,
    ) -> Result<Vec<SimilarCase>> {
        let record = self.finder.store().get_record(id)?;
        let vector = match record.vector {
            Some(vector) => {
                let actual = vector.len();
                match self.finder.store().dimension()? {
                    Some(expected) if expected != actual => {
                        return Err(Error::DimensionMismatch { expected, actual })
                    }
                    _ => vector,
                }
            }
            None => {
                debug!("Record {} has no vector, embedding its text", id);
                self.embed(&record.text)?
            }
        };
        self.rank(&record.text, &vector, Some(id), options)
    }

    pub fn show(&self, id: &str) -> Result<Record> {
        self.finder.store().get_record(id)
    }

    fn rank(
        &self,
        text: &str,
        vector: &[f32],
        exclude_id: Option<&str>,
        options: QueryOptions<'_>,
    ) -> Result<Vec<SimilarCase>> {
        let mut query = SimilarityQuery::new(text, vector)
            .with_scope(options.scope)
            .with_floor(options.floor)
            .with_max_results(options.max_results);
        if let Some(id) = exclude_id {
            query = query.excluding(id);
        }
        self.finder.find_similar(&query)
    }
}
