// SPDX-License-Identifier: MIT OR Apache-2.0

//! priorcase - Find prior incident reports similar to a new one
//!
//! Reports are embedded, stored in a local SQLite database and ranked by
//! cosine similarity, each match explained by the terms it shares with the
//! new report.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, EmbeddingCommands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // PRIORCASE_LOG=debug priorcase similar report.md
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("PRIORCASE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;

    match cli.command {
        Commands::Submit {
            file,
            origin,
            narrative,
            floor,
            limit,
        } => {
            commands::submit::run(
                &file,
                &origin,
                narrative.as_deref(),
                floor,
                limit,
                format,
                compact,
            )?;
        }
        Commands::Similar {
            file,
            id,
            scope,
            floor,
            limit,
            full,
        } => {
            commands::similar::run(
                file.as_deref(),
                id.as_deref(),
                scope.as_deref(),
                floor,
                limit,
                full,
                format,
                compact,
            )?;
        }
        Commands::Show { id } => {
            commands::show::run(&id, format, compact)?;
        }
        Commands::Import {
            file,
            input_format,
            embed,
            max_rows,
            origin,
        } => {
            commands::import::run(
                &file,
                input_format,
                embed,
                max_rows,
                &origin,
                format,
                compact,
            )?;
        }
        Commands::Embeddings(EmbeddingCommands::Summary { scope }) => {
            commands::embeddings::summary(scope.as_deref(), format, compact)?;
        }
        Commands::Embeddings(EmbeddingCommands::Backfill {
            scope,
            batch_size,
            limit,
        }) => {
            commands::embeddings::backfill(scope.as_deref(), batch_size, limit, format, compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "priorcase", &mut std::io::stdout());
        }
    }

    Ok(())
}
