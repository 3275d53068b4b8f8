// SPDX-License-Identifier: MIT OR Apache-2.0

//! Import occurrence rows from a CSV export or a JSONL file

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{open_service, progress_bar};
use crate::cli::{InputFormat, OutputFormat};
use priorcase::ingest::{import_csv, import_jsonl, ImportFormat, ImportOptions};
use priorcase::output::print_json;

/// Run the import command
pub fn run(
    file: &Path,
    input_format: Option<InputFormat>,
    embed: bool,
    max_rows: Option<usize>,
    origin: &str,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let input = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let (_, mut service) = open_service()?;

    if !embed && format == OutputFormat::Text {
        println!("Importing without embeddings (use --embed to enable)");
    }

    let options = ImportOptions {
        embed,
        max_rows,
        origin: origin.to_string(),
    };

    let layout = match input_format {
        Some(InputFormat::Csv) => ImportFormat::Csv,
        Some(InputFormat::Jsonl) => ImportFormat::Jsonl,
        None => ImportFormat::from_path(file),
    };

    let pb = progress_bar(None, "Importing");
    let (provider, store, retry) = service.parts_mut();
    let input = BufReader::new(input);
    let stats = match layout {
        ImportFormat::Csv => import_csv(input, store, Some((provider, retry)), &options, &pb),
        ImportFormat::Jsonl => import_jsonl(input, store, Some((provider, retry)), &options, &pb),
    }
    .with_context(|| format!("Failed to import {}", file.display()))?;
    pb.finish_and_clear();

    match format {
        OutputFormat::Json => print_json(&stats, compact)?,
        OutputFormat::Text => {
            println!(
                "Done. total={} inserted={} skipped={} duplicates={}",
                stats.total, stats.inserted, stats.skipped, stats.duplicates
            );
            if stats.embed_failures > 0 {
                println!(
                    "{} reports stored without a vector; run `priorcase embeddings backfill`",
                    stats.embed_failures
                );
            }
        }
    }

    Ok(())
}
