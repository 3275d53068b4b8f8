// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store a new report and list similar prior reports

use anyhow::{Context, Result};
use std::path::Path;

use super::{open_service, print_cases, read_report};
use crate::cli::OutputFormat;
use priorcase::output::{colorize_id, print_json, use_colors};
use priorcase::service::QueryOptions;

/// Run the submit command
pub fn run(
    file: &Path,
    origin: &str,
    narrative: Option<&Path>,
    floor: Option<f32>,
    limit: Option<usize>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let text = read_report(file)?;
    let narrative = narrative.map(read_report).transpose()?;
    let (_, mut service) = open_service()?;

    let options = QueryOptions {
        scope: None,
        floor,
        max_results: limit,
    };
    let submission = service
        .submit(&text, Some(origin), narrative.as_deref(), options)
        .with_context(|| format!("Failed to submit {}", file.display()))?;

    match format {
        OutputFormat::Json => print_json(&submission, compact)?,
        OutputFormat::Text => {
            println!(
                "Stored report {}\n",
                colorize_id(&submission.id, use_colors())
            );
            print_cases(&submission.similar, false);
        }
    }

    Ok(())
}
