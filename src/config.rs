// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for priorcase
//!
//! Loads configuration from .priorcaserc.toml in current directory or
//! ~/.config/priorcase/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::RetryPolicy;
use crate::explain::{CommandGenerator, ExplanationBuilder, DEFAULT_GENERATOR_TIMEOUT_SECS};
use crate::ranker::{RankingConfig, DEFAULT_FLOOR, DEFAULT_MAX_RESULTS, DEFAULT_SCAN_LIMIT};
use crate::store::sqlite::{STORE_DIR, STORE_FILE};
use crate::summary::{SummaryOptions, DEFAULT_FALLBACK_LINES, DEFAULT_MAX_CHARS, DEFAULT_SECTION};

pub const LOCAL_CONFIG_FILE: &str = ".priorcaserc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Http,
    Command,
    Hashing,
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Get database path (defaults to .priorcase/reports.sqlite under `root`)
    pub fn path(&self, root: &Path) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(STORE_DIR).join(STORE_FILE),
        }
    }
}

/// Ranking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RankingSection {
    /// Minimum similarity for a result
    pub floor: Option<f32>,
    /// Maximum number of similar cases returned
    pub max_results: Option<usize>,
    /// Newest records considered per query
    pub scan_limit: Option<usize>,
    /// Maximum shared keywords per result
    pub max_keywords: Option<usize>,
    /// Maximum excerpt length in characters
    pub excerpt_chars: Option<usize>,
    /// Lines used when a document has no summary section
    pub summary_lines: Option<usize>,
    /// Heading title of the summary section
    pub section: Option<String>,
}

impl RankingSection {
    /// Get floor (defaults to 0.75)
    pub fn floor(&self) -> f32 {
        self.floor.unwrap_or(DEFAULT_FLOOR)
    }

    /// Get max results (defaults to 3)
    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    /// Get scan limit (defaults to 1000)
    pub fn scan_limit(&self) -> usize {
        self.scan_limit.unwrap_or(DEFAULT_SCAN_LIMIT)
    }

    pub fn max_keywords(&self) -> usize {
        self.max_keywords
            .unwrap_or(crate::keywords::DEFAULT_MAX_KEYWORDS)
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            section: self
                .section
                .clone()
                .unwrap_or_else(|| DEFAULT_SECTION.to_string()),
            fallback_lines: self.summary_lines.unwrap_or(DEFAULT_FALLBACK_LINES),
            max_chars: self.excerpt_chars.unwrap_or(DEFAULT_MAX_CHARS),
        }
    }

    /// Builds the ranking parameters used by every query path.
    pub fn to_ranking_config(&self) -> RankingConfig {
        RankingConfig {
            floor: self.floor(),
            max_results: self.max_results(),
            scan_limit: self.scan_limit(),
            max_keywords: self.max_keywords(),
            summary: self.summary_options(),
            include_narrative: false,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (http, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Base URL of the HTTP embeddings API
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Output size of the hashing provider
    pub dimension: Option<usize>,
    /// Input is cut to this many characters before embedding
    pub max_chars: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub retry_limit: Option<u32>,
    pub retry_base_ms: Option<u64>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Http)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "text-embedding-3-small")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("text-embedding-3-small")
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get hashing dimension (defaults to 1536)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(1536)
    }

    /// Get max chars (defaults to 8000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(8000)
    }

    /// Get timeout in seconds (defaults to 30)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy::new(
            self.retry_limit.unwrap_or(defaults.limit),
            self.retry_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        )
    }
}

/// Explanation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Command that phrases explanations; the template is used when unset
    pub command: Option<String>,
    /// Seconds before a running command is killed
    pub timeout_secs: Option<u64>,
}

impl ExplanationConfig {
    /// Get timeout in seconds (defaults to 15)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_GENERATOR_TIMEOUT_SECS)
    }

    pub fn builder(&self) -> ExplanationBuilder {
        match self.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => ExplanationBuilder::with_generator(Box::new(
                CommandGenerator::new(command)
                    .with_timeout(Duration::from_secs(self.timeout_secs())),
            )),
            _ => ExplanationBuilder::new(),
        }
    }
}

/// Configuration loaded from .priorcaserc.toml or ~/.config/priorcase/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ranking: RankingSection,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub explanations: ExplanationConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .priorcaserc.toml in current directory
    /// 2. ~/.config/priorcase/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(LOCAL_CONFIG_FILE)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("priorcase").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }
}
