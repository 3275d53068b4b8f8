// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus scan and ranking of prior reports against a query.
//!
//! Every call site goes through [`rank_candidates`] (or
//! [`SimilarityFinder::find_similar`], which loads the pool from a store
//! first), parameterized by floor, result cap and scope.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::explain::ExplanationBuilder;
use crate::keywords::{shared_keywords, DEFAULT_MAX_KEYWORDS};
use crate::similarity::{is_zero_vector, similarity};
use crate::store::{Record, RecordStore};
use crate::summary::{extract_summary, find_section, SummaryOptions};

/// Default similarity floor for every call site.
pub const DEFAULT_FLOOR: f32 = 0.75;
/// Default number of similar reports returned.
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Default number of most recent records scanned per query.
pub const DEFAULT_SCAN_LIMIT: usize = 1000;

/// Configuration for ranking
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Minimum cosine similarity a candidate needs to be kept
    pub floor: f32,
    /// Maximum results to return
    pub max_results: usize,
    /// Number of most recent records loaded from the store
    pub scan_limit: usize,
    /// Keywords per document used for the overlap
    pub max_keywords: usize,
    /// Excerpt extraction settings
    pub summary: SummaryOptions,
    /// Attach the full narrative to each result
    pub include_narrative: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR,
            max_results: DEFAULT_MAX_RESULTS,
            scan_limit: DEFAULT_SCAN_LIMIT,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            summary: SummaryOptions::default(),
            include_narrative: false,
        }
    }
}

impl RankingConfig {
    /// Set the similarity floor
    pub fn with_floor(mut self, floor: f32) -> Self {
        self.floor = floor;
        self
    }

    /// Set maximum results
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Set how many recent records are scanned
    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Attach full narratives to results
    pub fn with_narrative(mut self, include: bool) -> Self {
        self.include_narrative = include;
        self
    }
}

/// A prior report judged similar to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarCase {
    /// Id of the matched record
    pub id: String,
    /// Cosine similarity to the query (-1.0 to 1.0)
    pub score: f32,
    /// Why the record was matched
    pub explanation: String,
    /// Bounded display excerpt
    pub excerpt: String,
    /// Salient terms present in both reports
    pub shared_terms: Vec<String>,
    /// Creation time of the matched record (unix milliseconds)
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Full analysis text, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

/// Parameters of a single similarity query.
#[derive(Debug, Clone, Default)]
pub struct SimilarityQuery<'a> {
    pub text: &'a str,
    pub vector: &'a [f32],
    /// Restrict candidates to this origin
    pub scope: Option<&'a str>,
    /// Never return this record (the query's own id)
    pub exclude_id: Option<&'a str>,
    /// Overrides the configured floor
    pub floor: Option<f32>,
    /// Overrides the configured result cap
    pub max_results: Option<usize>,
}

impl<'a> SimilarityQuery<'a> {
    pub fn new(text: &'a str, vector: &'a [f32]) -> Self {
        Self {
            text,
            vector,
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: Option<&'a str>) -> Self {
        self.scope = scope;
        self
    }

    pub fn excluding(mut self, id: &'a str) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn with_floor(mut self, floor: Option<f32>) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }
}

/// Rejects queries that cannot be ranked.
pub fn validate_query(text: &str, vector: &[f32]) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput("query text is empty".to_string()));
    }
    if vector.is_empty() || is_zero_vector(vector) {
        return Err(Error::InvalidInput(
            "query vector is empty or all zeros".to_string(),
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "query vector has non-finite components".to_string(),
        ));
    }
    Ok(())
}

/// Scores, filters, annotates, sorts and truncates a candidate pool.
///
/// Candidates without a vector are skipped quietly; candidates whose vector
/// cannot be compared are logged and skipped. An empty result is a valid
/// "no matches" answer.
pub fn rank_candidates(
    query_text: &str,
    query_vector: &[f32],
    candidates: Vec<Record>,
    config: &RankingConfig,
    explainer: &ExplanationBuilder,
) -> Result<Vec<SimilarCase>> {
    validate_query(query_text, query_vector)?;

    let mut scored: Vec<(f32, Record)> = Vec::new();
    for record in candidates {
        let Some(vector) = record.vector.as_deref() else {
            debug!("Skipping record {} without a vector", record.id);
            continue;
        };

        let score = match similarity(query_vector, vector) {
            Ok(score) => score,
            Err(err) => {
                let malformed = Error::MalformedVector {
                    id: record.id.clone(),
                    reason: err.to_string(),
                };
                warn!("Skipping candidate: {}", malformed);
                continue;
            }
        };

        if score >= config.floor {
            scored.push((score, record));
        }
    }

    scored.sort_by(|(score_a, a), (score_b, b)| compare_ranked(*score_a, a, *score_b, b));
    scored.truncate(config.max_results);

    let results = scored
        .into_iter()
        .map(|(score, record)| annotate(query_text, score, record, config, explainer))
        .collect();

    Ok(results)
}

/// Score descending, then newest first, then id for a total order.
fn compare_ranked(score_a: f32, a: &Record, score_b: f32, b: &Record) -> Ordering {
    score_b
        .partial_cmp(&score_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn annotate(
    query_text: &str,
    score: f32,
    record: Record,
    config: &RankingConfig,
    explainer: &ExplanationBuilder,
) -> SimilarCase {
    let shared_terms = shared_keywords(query_text, &record.text, config.max_keywords);
    let explanation = explainer.explain(query_text, &record.text, &shared_terms, score);
    let excerpt = excerpt_for(&record, &config.summary);

    SimilarCase {
        id: record.id,
        score,
        explanation,
        excerpt,
        shared_terms,
        created_at: record.created_at,
        origin: record.origin,
        narrative: if config.include_narrative {
            record.narrative
        } else {
            None
        },
    }
}

/// Prefers the summary section of the analysis, then of the report text.
fn excerpt_for(record: &Record, options: &SummaryOptions) -> String {
    match record.narrative.as_deref() {
        Some(narrative) if find_section(narrative, &options.section).is_some() => {
            extract_summary(narrative, options)
        }
        _ => extract_summary(&record.text, options),
    }
}

/// Finds similar prior reports in a [`RecordStore`].
pub struct SimilarityFinder<S> {
    store: S,
    config: RankingConfig,
    explainer: ExplanationBuilder,
}

impl<S: RecordStore> SimilarityFinder<S> {
    pub fn new(store: S, config: RankingConfig, explainer: ExplanationBuilder) -> Self {
        Self {
            store,
            config,
            explainer,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Loads the candidate pool and ranks it against the query.
    pub fn find_similar(&self, query: &SimilarityQuery<'_>) -> Result<Vec<SimilarCase>> {
        validate_query(query.text, query.vector)?;

        let candidates =
            self.store
                .list_candidates(query.scope, query.exclude_id, self.config.scan_limit)?;
        debug!("Scanning {} candidate records", candidates.len());

        let mut config = self.config.clone();
        if let Some(floor) = query.floor {
            config.floor = floor;
        }
        if let Some(max) = query.max_results {
            config.max_results = max;
        }

        rank_candidates(query.text, query.vector, candidates, &config, &self.explainer)
    }
}
