// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding backfill for records stored without a vector.

use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::embedding::{embed_batch_with_retry, embed_with_retry, EmbeddingProvider, RetryPolicy};
use crate::errors::{Error, Result};
use crate::store::{Record, RecordStore};

pub const DEFAULT_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Only records with this origin
    pub scope: Option<String>,
    /// Records fetched per round
    pub batch_size: usize,
    /// Stop after embedding this many records
    pub limit: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            scope: None,
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub embedded: usize,
    /// Records whose embedding could not be obtained
    pub failed: usize,
    /// Vectors refused because their length differs from the corpus
    pub rejected: usize,
    pub batches: usize,
}

/// Embeds records with a null vector, newest first.
///
/// Records holding a malformed vector count as null. A record that fails is
/// logged and left as it was; it is not retried within the same run.
/// Vectors whose length differs from the corpus are counted as rejected.
/// The run ends when no eligible record is left or `limit` records have
/// been embedded.
pub fn backfill<S: RecordStore + ?Sized>(
    store: &mut S,
    provider: &mut dyn EmbeddingProvider,
    retry: &RetryPolicy,
    options: &BackfillOptions,
    progress: &ProgressBar,
) -> Result<BackfillStats> {
    let batch_size = options.batch_size.max(1);
    let scope = options.scope.as_deref();
    let mut stats = BackfillStats::default();
    let mut given_up: HashSet<String> = HashSet::new();

    loop {
        let remaining = match options.limit {
            Some(limit) if stats.embedded >= limit => break,
            Some(limit) => (limit - stats.embedded).min(batch_size),
            None => batch_size,
        };

        let batch: Vec<Record> = store
            .records_missing_vector(scope, remaining + given_up.len())?
            .into_iter()
            .filter(|record| !given_up.contains(&record.id))
            .take(remaining)
            .collect();
        if batch.is_empty() {
            break;
        }

        stats.batches += 1;
        for chunk in batch.chunks(provider.batch_size().max(1)) {
            let vectors = embed_chunk(store, provider, retry, chunk)?;
            for (record, vector) in chunk.iter().zip(vectors) {
                progress.inc(1);
                let vector = match vector {
                    Ok(vector) => vector,
                    Err(err) => {
                        give_up(&mut stats, &mut given_up, record, err);
                        continue;
                    }
                };
                match store.attach_vector(&record.id, &vector) {
                    Ok(true) => stats.embedded += 1,
                    Ok(false) => {
                        given_up.insert(record.id.clone());
                    }
                    Err(err @ (Error::DimensionMismatch { .. } | Error::InvalidInput(_))) => {
                        give_up(&mut stats, &mut given_up, record, err)
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        info!(
            batch = stats.batches,
            embedded = stats.embedded,
            failed = stats.failed + stats.rejected,
            "Backfill batch done"
        );
    }

    Ok(stats)
}

/// Leaves `record` null for the rest of the run.
fn give_up(
    stats: &mut BackfillStats,
    given_up: &mut HashSet<String>,
    record: &Record,
    err: Error,
) {
    if matches!(err, Error::DimensionMismatch { .. }) {
        warn!("Rejected vector for {}: {}", record.id, err);
        stats.rejected += 1;
    } else {
        warn!("Embedding failed for {}: {}", record.id, err);
        stats.failed += 1;
    }
    given_up.insert(record.id.clone());
}

/// Embeds a chunk in one call, falling back to one call per record so a
/// single bad record does not sink the rest. A batch of the wrong
/// dimension is rejected as a whole.
fn embed_chunk<S: RecordStore + ?Sized>(
    store: &S,
    provider: &mut dyn EmbeddingProvider,
    retry: &RetryPolicy,
    chunk: &[Record],
) -> Result<Vec<Result<Vec<f32>>>> {
    let texts: Vec<String> = chunk.iter().map(|r| r.text.clone()).collect();
    let expected = store.dimension()?;

    match embed_batch_with_retry(provider, &texts, retry, expected) {
        Ok(vectors) => return Ok(vectors.into_iter().map(Ok).collect()),
        Err(Error::DimensionMismatch { expected, actual }) => {
            return Ok(chunk
                .iter()
                .map(|_| Err(Error::DimensionMismatch { expected, actual }))
                .collect())
        }
        Err(err) if chunk.len() == 1 => return Ok(vec![Err(err)]),
        Err(err) => warn!("Batch embedding failed, retrying per record: {}", err),
    }

    Ok(chunk
        .iter()
        .map(|record| embed_with_retry(provider, &record.text, retry, expected))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::store::{MemoryRecordStore, NewRecord};

    fn seeded(n: usize) -> MemoryRecordStore {
        let mut store = MemoryRecordStore::new();
        for i in 0..n {
            let origin = if i % 2 == 0 { "imported" } else { "internal" };
            store
                .insert_record(
                    NewRecord::new(format!("Report {} about a runway excursion", i))
                        .with_origin(origin),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn fills_every_missing_vector() {
        let mut store = seeded(5);
        let mut provider = HashingProvider::new(32);
        let options = BackfillOptions {
            batch_size: 2,
            ..Default::default()
        };
        let stats = backfill(
            &mut store,
            &mut provider,
            &RetryPolicy::none(),
            &options,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.embedded, 5);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.batches, 3);
        assert_eq!(store.coverage(None).unwrap().missing, 0);
    }

    #[test]
    fn respects_scope_and_limit() {
        let mut store = seeded(6);
        let mut provider = HashingProvider::new(32);
        let options = BackfillOptions {
            scope: Some("imported".to_string()),
            batch_size: 10,
            limit: Some(2),
        };
        let stats = backfill(
            &mut store,
            &mut provider,
            &RetryPolicy::none(),
            &options,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.embedded, 2);
        assert_eq!(store.coverage(Some("imported")).unwrap().missing, 1);
        assert_eq!(store.coverage(Some("internal")).unwrap().missing, 3);
    }

    #[test]
    fn failing_records_are_skipped_not_looped() {
        let mut store = seeded(2);
        store.insert_record(NewRecord::new("the and of")).unwrap();
        let mut provider = HashingProvider::new(32);
        let options = BackfillOptions {
            batch_size: 1,
            ..Default::default()
        };
        let stats = backfill(
            &mut store,
            &mut provider,
            &RetryPolicy::none(),
            &options,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(store.coverage(None).unwrap().missing, 1);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut store = MemoryRecordStore::new();
        store
            .insert_record(NewRecord::new("seed").with_vector(vec![1.0; 16]))
            .unwrap();
        store
            .insert_record(NewRecord::new("engine fire on climb"))
            .unwrap();
        let mut provider = HashingProvider::new(32);
        let stats = backfill(
            &mut store,
            &mut provider,
            &RetryPolicy::none(),
            &BackfillOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.embedded, 0);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(store.coverage(None).unwrap().missing, 1);
    }

    /// Refuses batches, and fails every other single-text call transiently.
    struct Choppy {
        calls: usize,
    }

    impl EmbeddingProvider for Choppy {
        fn model_id(&self) -> &str {
            "choppy"
        }

        fn batch_size(&self) -> usize {
            8
        }

        fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls += 1;
            if texts.len() > 1 {
                return Err(Error::dependency("embedding service", "batch too large"));
            }
            if self.calls % 2 == 0 {
                return Err(Error::transient("embedding service", "timeout"));
            }
            Ok(vec![vec![0.6, 0.8]])
        }
    }

    #[test]
    fn per_record_fallback_retries_transient_failures() {
        let mut store = seeded(2);
        let mut provider = Choppy { calls: 0 };
        let stats = backfill(
            &mut store,
            &mut provider,
            &RetryPolicy::new(2, std::time::Duration::from_millis(1)),
            &BackfillOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(provider.calls, 5);
    }
}
