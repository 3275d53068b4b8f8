// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding coverage summary and backfill

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Instant;

use super::{open_service, progress_bar, Service};
use crate::cli::OutputFormat;
use priorcase::backfill::{backfill as run_backfill, BackfillOptions, BackfillStats};
use priorcase::output::print_json;
use priorcase::store::{RecordStore, VectorCoverage};

#[derive(Debug, Serialize)]
struct SummaryResult<'a> {
    scope: Option<&'a str>,
    #[serde(flatten)]
    coverage: VectorCoverage,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BackfillResult<'a> {
    #[serde(flatten)]
    stats: BackfillStats,
    model: &'a str,
    elapsed_secs: f64,
    summary: SummaryResult<'a>,
}

fn summarize<'a>(service: &Service, scope: Option<&'a str>) -> Result<SummaryResult<'a>> {
    let store = service.store();
    Ok(SummaryResult {
        scope,
        coverage: store.coverage(scope)?,
        dimension: store.dimension()?,
    })
}

fn print_summary(summary: &SummaryResult<'_>) {
    let title = match summary.scope {
        Some(scope) => format!("--- Embedding Summary ({}) ---", scope),
        None => "--- Embedding Summary ---".to_string(),
    };
    println!("{}", title);
    println!("Total reports      : {}", summary.coverage.total);
    println!("With embedding     : {}", summary.coverage.with_vector);
    println!("Missing embedding  : {}", summary.coverage.missing);
    if summary.coverage.malformed > 0 {
        println!("  unreadable vector: {}", summary.coverage.malformed);
    }
    if let Some(dim) = summary.dimension {
        println!("Dimension          : {}", dim);
    }
}

/// Run the embeddings summary command
pub fn summary(scope: Option<&str>, format: OutputFormat, compact: bool) -> Result<()> {
    let (_, service) = open_service()?;
    let summary = summarize(&service, scope)?;

    match format {
        OutputFormat::Json => print_json(&summary, compact)?,
        OutputFormat::Text => print_summary(&summary),
    }
    Ok(())
}

/// Run the embeddings backfill command
pub fn backfill(
    scope: Option<&str>,
    batch_size: usize,
    limit: Option<usize>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let (_, mut service) = open_service()?;
    let options = BackfillOptions {
        scope: scope.map(str::to_string),
        batch_size,
        limit,
    };

    let pending = service.store().coverage(scope)?.missing;
    let total = limit.map_or(pending, |l| pending.min(l as u64));
    let pb = progress_bar(Some(total), "Embedding");
    let started = Instant::now();

    let (provider, store, retry) = service.parts_mut();
    let model = provider.model_id().to_string();
    let stats = run_backfill(store, provider, retry, &options, &pb)
        .context("Embedding backfill failed")?;
    pb.finish_and_clear();

    let elapsed = started.elapsed().as_secs_f64();
    let summary = summarize(&service, scope)?;

    match format {
        OutputFormat::Json => print_json(
            &BackfillResult {
                stats,
                model: &model,
                elapsed_secs: elapsed,
                summary,
            },
            compact,
        )?,
        OutputFormat::Text => {
            println!(
                "Done. embedded={} failed={} rejected={} in {:.1}s (model={})\n",
                stats.embedded,
                stats.failed,
                stats.rejected,
                elapsed,
                model
            );
            print_summary(&summary);
        }
    }
    Ok(())
}
