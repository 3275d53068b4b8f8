// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry around embedding calls.

use std::thread;
use std::time::Duration;

use super::provider::EmbeddingProvider;
use crate::errors::{Error, Result};
use crate::similarity::is_zero_vector;

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 500;

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub limit: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RETRY_LIMIT,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(limit: u32, base_delay: Duration) -> Self {
        Self { limit, base_delay }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op`, retrying transient failures up to `limit` times.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.limit => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        limit = self.limit,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed, retrying: {}",
                        what,
                        err
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Embeds a batch of texts with retries, checking every returned vector.
///
/// When `expected_dim` is known, vectors of another length fail with
/// `DimensionMismatch` instead of reaching the store. Zero vectors are a
/// provider failure, never a result.
pub fn embed_batch_with_retry(
    provider: &mut dyn EmbeddingProvider,
    texts: &[String],
    policy: &RetryPolicy,
    expected_dim: Option<usize>,
) -> Result<Vec<Vec<f32>>> {
    let vectors = policy.run("embedding request", || provider.embed_texts(texts))?;

    if vectors.len() != texts.len() {
        return Err(Error::dependency(
            "embedding service",
            format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
        ));
    }

    let mut dim = expected_dim;
    for vector in &vectors {
        if vector.is_empty() {
            return Err(Error::dependency(
                "embedding service",
                "returned an empty embedding",
            ));
        }
        if is_zero_vector(vector) {
            return Err(Error::dependency(
                "embedding service",
                "returned a zero embedding",
            ));
        }
        match dim {
            Some(expected) if expected != vector.len() => {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
            Some(_) => {}
            None => dim = Some(vector.len()),
        }
    }

    Ok(vectors)
}

/// Single-text variant of [`embed_batch_with_retry`].
pub fn embed_with_retry(
    provider: &mut dyn EmbeddingProvider,
    text: &str,
    policy: &RetryPolicy,
    expected_dim: Option<usize>,
) -> Result<Vec<f32>> {
    let mut vectors =
        embed_batch_with_retry(provider, &[text.to_string()], policy, expected_dim)?;
    vectors
        .pop()
        .ok_or_else(|| Error::dependency("embedding service", "no embedding returned"))
}
