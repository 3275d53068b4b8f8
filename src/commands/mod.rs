// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations

pub mod embeddings;
pub mod import;
pub mod show;
pub mod similar;
pub mod submit;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use priorcase::config::Config;
use priorcase::output::{
    colorize_excerpt, colorize_heading, colorize_id, colorize_score, colorize_term, indent,
    use_colors,
};
use priorcase::ranker::{RankingConfig, SimilarCase};
use priorcase::service::CaseService;
use priorcase::store::SqliteRecordStore;

pub(crate) type Service = CaseService<SqliteRecordStore>;

/// Loads config and opens the store under the current directory.
pub(crate) fn open_service() -> Result<(Config, Service)> {
    let config = Config::load();
    let ranking = config.ranking.to_ranking_config();
    let service = open_service_with(&config, ranking)?;
    Ok((config, service))
}

pub(crate) fn open_service_with(config: &Config, ranking: RankingConfig) -> Result<Service> {
    let root = std::env::current_dir()?;
    let path = config.store.path(&root);
    CaseService::open_with_ranking(config, &root, ranking)
        .with_context(|| format!("Failed to open report store at {}", path.display()))
}

pub(crate) fn read_report(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))
}

pub(crate) fn progress_bar(len: Option<u64>, label: &str) -> ProgressBar {
    let pb = match len {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    let template = match len {
        Some(_) => "[{bar:40.cyan/blue}] {pos}/{len} reports | {msg}",
        None => "{spinner} {pos} rows | {msg}",
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("valid progress bar template")
            .progress_chars("##."),
    );
    pb.set_message(label.to_string());
    pb
}

/// Prints ranked cases for humans.
pub(crate) fn print_cases(cases: &[SimilarCase], full: bool) {
    let color = use_colors();

    if cases.is_empty() {
        println!("No similar prior reports found.");
        return;
    }

    println!(
        "{}\n",
        colorize_heading(&format!("Similar prior reports ({})", cases.len()), color)
    );

    for (rank, case) in cases.iter().enumerate() {
        let origin = case
            .origin
            .as_deref()
            .map(|o| format!("  [{}]", o))
            .unwrap_or_default();
        println!(
            "  {}. {}  score {}{}",
            rank + 1,
            colorize_id(&case.id, color),
            colorize_score(case.score, color),
            origin
        );
        println!("{}", indent(&case.explanation, 5));

        if !case.shared_terms.is_empty() {
            let terms: Vec<String> = case
                .shared_terms
                .iter()
                .map(|t| colorize_term(t, color))
                .collect();
            println!("     Shared terms: {}", terms.join(", "));
        }

        if !case.excerpt.is_empty() {
            println!();
            println!("{}", colorize_excerpt(&indent(&case.excerpt, 7), color));
        }

        if full {
            if let Some(narrative) = &case.narrative {
                println!();
                println!("{}", indent(narrative, 7));
            }
        }
        println!();
    }
}
