// SPDX-License-Identifier: MIT OR Apache-2.0

//! List reports similar to a file or a stored report

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::{open_service_with, print_cases, read_report};
use crate::cli::OutputFormat;
use priorcase::config::Config;
use priorcase::output::print_json;
use priorcase::ranker::SimilarCase;
use priorcase::service::QueryOptions;

#[derive(Debug, Serialize)]
struct SimilarResult<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
    results: &'a [SimilarCase],
}

/// Run the similar command
#[allow(clippy::too_many_arguments)]
pub fn run(
    file: Option<&Path>,
    id: Option<&str>,
    scope: Option<&str>,
    floor: Option<f32>,
    limit: Option<usize>,
    full: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let config = Config::load();
    let ranking = config.ranking.to_ranking_config().with_narrative(full);
    let mut service = open_service_with(&config, ranking)?;

    let options = QueryOptions {
        scope,
        floor,
        max_results: limit,
    };

    let cases = match (id, file) {
        (Some(id), _) => service
            .similar_to_record(id, options)
            .with_context(|| format!("Failed to rank reports similar to {}", id))?,
        (None, Some(file)) => {
            let text = read_report(file)?;
            service
                .similar_to_text(&text, options)
                .with_context(|| format!("Failed to rank reports similar to {}", file.display()))?
        }
        (None, None) => anyhow::bail!("Either a report file or --id is required"),
    };

    match format {
        OutputFormat::Json => print_json(
            &SimilarResult {
                id,
                scope,
                results: &cases,
            },
            compact,
        )?,
        OutputFormat::Text => print_cases(&cases, full),
    }

    Ok(())
}
