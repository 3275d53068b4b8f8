// SPDX-License-Identifier: MIT OR Apache-2.0

//! Natural-language justification for why two reports were matched.
//!
//! The deterministic template is always available. An optional
//! [`TextGenerator`] may phrase the body instead; whenever it fails or
//! produces something unusable the template is used.

use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::process::run_with_timeout;

/// Appended to every explanation.
pub const CAUTION: &str =
    "Similarity is heuristic; the operational context of each occurrence may differ.";

/// Characters of each report included in a generation prompt.
const PROMPT_EXCERPT_CHARS: usize = 600;

/// Seconds a generation command may run before it is killed.
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 15;

const SERVICE: &str = "text generation";

/// Opaque text-in/text-out generation service.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Builds explanations, optionally delegating the phrasing.
#[derive(Default)]
pub struct ExplanationBuilder {
    generator: Option<Box<dyn TextGenerator>>,
}

impl ExplanationBuilder {
    /// Template-only builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(generator: Box<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Explains why `candidate_text` was matched to `current_text`.
    pub fn explain(
        &self,
        current_text: &str,
        candidate_text: &str,
        shared_terms: &[String],
        score: f32,
    ) -> String {
        let body = self
            .generated_body(current_text, candidate_text, shared_terms, score)
            .unwrap_or_else(|| template_body(shared_terms));
        format!("{} Similarity score: {:.2}. {}", body, score, CAUTION)
    }

    fn generated_body(
        &self,
        current_text: &str,
        candidate_text: &str,
        shared_terms: &[String],
        score: f32,
    ) -> Option<String> {
        let generator = self.generator.as_ref()?;
        let prompt = build_prompt(current_text, candidate_text, shared_terms, score);

        let text = match generator.generate(&prompt) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!("Explanation generator failed, using template: {}", err);
                return None;
            }
        };

        if text.is_empty() {
            debug!("Explanation generator returned nothing, using template");
            return None;
        }

        if !shared_terms.is_empty() {
            let lowered = text.to_lowercase();
            if !shared_terms.iter().any(|term| lowered.contains(term.as_str())) {
                debug!("Generated explanation names no shared term, using template");
                return None;
            }
        }

        Some(text)
    }
}

/// Deterministic body naming the shared terms, or a pattern-level sentence.
pub fn template_body(shared_terms: &[String]) -> String {
    if shared_terms.is_empty() {
        "No distinctive terms are shared; the match reflects pattern-level similarity \
         in the overall narrative."
            .to_string()
    } else {
        format!("Both reports mention {}.", shared_terms.join(", "))
    }
}

fn build_prompt(current: &str, candidate: &str, shared_terms: &[String], score: f32) -> String {
    let terms = if shared_terms.is_empty() {
        "(none)".to_string()
    } else {
        shared_terms.join(", ")
    };
    format!(
        "In one or two sentences, explain why these two safety reports are related. \
         Mention the shared terms by name. Do not restate the score.\n\n\
         Shared terms: {}\nSimilarity: {:.2}\n\nNew report:\n{}\n\nPrior report:\n{}\n",
        terms,
        score,
        excerpt(current),
        excerpt(candidate)
    )
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(PROMPT_EXCERPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Generator that shells out to an external command.
///
/// The prompt is written to stdin; stdout is the generated text. A command
/// that outlives its timeout is killed and counts as a failure.
pub struct CommandGenerator {
    command: String,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(DEFAULT_GENERATOR_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let output = run_with_timeout(
            SERVICE,
            &self.command,
            prompt.as_bytes().to_vec(),
            self.timeout,
        )?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transient(
                SERVICE,
                format!("command exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
