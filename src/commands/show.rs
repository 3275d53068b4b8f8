// SPDX-License-Identifier: MIT OR Apache-2.0

//! Print a stored report

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde::Serialize;

use super::open_service;
use crate::cli::OutputFormat;
use priorcase::output::{colorize_excerpt, colorize_id, indent, print_json, use_colors};
use priorcase::store::Record;
use priorcase::summary::extract_summary;

#[derive(Debug, Serialize)]
struct ShowResult {
    #[serde(flatten)]
    record: Record,
    vector_dim: Option<usize>,
    excerpt: String,
}

/// Run the show command
pub fn run(id: &str, format: OutputFormat, compact: bool) -> Result<()> {
    let (config, service) = open_service()?;
    let record = service.show(id)?;
    let excerpt = extract_summary(&record.text, &config.ranking.summary_options());
    let vector_dim = record.vector.as_ref().map(Vec::len);

    match format {
        OutputFormat::Json => print_json(
            &ShowResult {
                record,
                vector_dim,
                excerpt,
            },
            compact,
        )?,
        OutputFormat::Text => {
            let color = use_colors();
            let created = Utc
                .timestamp_millis_opt(record.created_at)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| record.created_at.to_string());

            println!("Report   {}", colorize_id(&record.id, color));
            println!("Origin   {}", record.origin.as_deref().unwrap_or("-"));
            if let Some(external_ref) = &record.external_ref {
                println!("Ref      {}", external_ref);
            }
            println!("Created  {}", created);
            match vector_dim {
                Some(dim) => println!("Vector   {} dimensions", dim),
                None => println!("Vector   missing (pending backfill)"),
            }
            println!();
            println!("{}", colorize_excerpt(&indent(&excerpt, 2), color));
        }
    }

    Ok(())
}
