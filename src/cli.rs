// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// priorcase - Find prior incident reports similar to a new one
///
/// Embeds incident reports, keeps them in a local SQLite store and ranks the
/// corpus by semantic similarity, explaining each match.
#[derive(Parser, Debug)]
#[command(name = "priorcase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Layout of an import file
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    Csv,
    Jsonl,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a new report and list similar prior reports
    Submit {
        /// File containing the report text
        file: PathBuf,

        /// Scope tag stored with the report
        #[arg(long, default_value = "internal")]
        origin: String,

        /// File containing the analysis narrative
        #[arg(long)]
        narrative: Option<PathBuf>,

        /// Minimum similarity score
        #[arg(long)]
        floor: Option<f32>,

        /// Maximum number of similar reports
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,
    },

    /// List reports similar to a file or a stored report, without storing
    #[command(alias = "sim")]
    Similar {
        /// File containing the report text
        #[arg(required_unless_present = "id", conflicts_with = "id")]
        file: Option<PathBuf>,

        /// Id of a stored report
        #[arg(long)]
        id: Option<String>,

        /// Only compare against reports with this origin
        #[arg(long)]
        scope: Option<String>,

        /// Minimum similarity score
        #[arg(long)]
        floor: Option<f32>,

        /// Maximum number of similar reports
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,

        /// Include the full narrative of each match
        #[arg(long)]
        full: bool,
    },

    /// Print a stored report
    Show {
        /// Record id
        id: String,
    },

    /// Import occurrence rows from a CSV export or a JSONL file
    Import {
        /// CSV file with a header row, or JSONL with one occurrence per line
        file: PathBuf,

        /// Input layout (defaults to csv for .csv files, jsonl otherwise)
        #[arg(long, value_enum)]
        input_format: Option<InputFormat>,

        /// Embed reports while importing
        #[arg(long)]
        embed: bool,

        /// Stop after this many rows
        #[arg(long)]
        max_rows: Option<usize>,

        /// Scope tag stored with imported reports
        #[arg(long, default_value = "imported")]
        origin: String,
    },

    /// Inspect or fill embedding coverage
    #[command(subcommand)]
    Embeddings(EmbeddingCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum EmbeddingCommands {
    /// Count reports with and without a vector
    Summary {
        /// Only count reports with this origin
        #[arg(long)]
        scope: Option<String>,
    },

    /// Embed reports that have no vector yet, newest first
    Backfill {
        /// Only reports with this origin
        #[arg(long)]
        scope: Option<String>,

        /// Reports fetched per batch
        #[arg(long, default_value_t = 200)]
        batch_size: usize,

        /// Stop after embedding this many reports
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn similar_needs_file_or_id() {
        assert!(Cli::try_parse_from(["priorcase", "similar"]).is_err());
        assert!(Cli::try_parse_from(["priorcase", "similar", "a.md", "--id", "x"]).is_err());
        let cli = Cli::try_parse_from(["priorcase", "--format", "json", "similar", "--id", "x"])
            .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Similar { id: Some(_), .. }));
    }

    #[test]
    fn import_format_is_optional() {
        let cli = Cli::try_parse_from([
            "priorcase",
            "import",
            "cadors.txt",
            "--input-format",
            "csv",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Import {
                input_format: Some(InputFormat::Csv),
                ..
            }
        ));
        let cli = Cli::try_parse_from(["priorcase", "import", "rows.jsonl"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Import {
                input_format: None,
                ..
            }
        ));
    }

    #[test]
    fn backfill_defaults() {
        let cli = Cli::try_parse_from(["priorcase", "embeddings", "backfill"]).unwrap();
        match cli.command {
            Commands::Embeddings(EmbeddingCommands::Backfill {
                batch_size, limit, ..
            }) => {
                assert_eq!(batch_size, 200);
                assert!(limit.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
