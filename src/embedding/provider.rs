// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers turn report text into dense vectors. Failures that may go away
//! on their own (timeouts, rate limits, a command that exits non-zero) are
//! reported as transient so callers can retry; a provider never substitutes
//! a zero vector for a failed call.

use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{Error, Result};
use crate::keywords::{is_stop_word, tokens, MIN_KEYWORD_LEN};
use crate::process::run_with_timeout;
use crate::similarity::{is_zero_vector, l2_normalize};

const SERVICE: &str = "embedding service";
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
const DEFAULT_HTTP_BATCH_SIZE: usize = 16;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Trait for embedding providers.
pub trait EmbeddingProvider {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| Error::dependency(SERVICE, "no embedding returned"))
    }
}

/// Builds the provider selected in configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Http => Box::new(HttpProvider::from_config(config)?),
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_max_chars(config.max_chars())
                .with_timeout(Duration::from_secs(config.timeout_secs())),
        ),
        EmbeddingProviderType::Hashing => Box::new(
            HashingProvider::new(config.dimension()).with_max_chars(config.max_chars()),
        ),
    };
    Ok(provider)
}

/// OpenAI-compatible HTTP embeddings endpoint (`POST {endpoint}/embeddings`).
pub struct HttpProvider {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_chars: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpProvider {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::dependency(SERVICE, format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            api_key,
            model: model.into(),
            max_chars: usize::MAX,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(config.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty());
        Ok(Self::new(
            config.endpoint(),
            config.model(),
            api_key,
            Duration::from_secs(config.timeout_secs()),
        )?
        .with_max_chars(config.max_chars()))
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

impl EmbeddingProvider for HttpProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        DEFAULT_HTTP_BATCH_SIZE
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input = truncate_texts(texts, self.max_chars);
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                Error::transient(SERVICE, e.to_string())
            } else {
                Error::dependency(SERVICE, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            let message = format!("HTTP {}: {}", status, detail.trim());
            return Err(
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    Error::transient(SERVICE, message)
                } else {
                    Error::dependency(SERVICE, message)
                },
            );
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::dependency(SERVICE, format!("unexpected response: {}", e)))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        if data.len() != texts.len() {
            return Err(Error::dependency(
                SERVICE,
                format!("expected {} embeddings, got {}", texts.len(), data.len()),
            ));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Command provider that shells out to an external process.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
    max_chars: usize,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
            max_chars: usize::MAX,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": truncate_texts(texts, self.max_chars),
        });

        let output = run_with_timeout(
            SERVICE,
            &self.command,
            payload.to_string().into_bytes(),
            self.timeout,
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transient(
                SERVICE,
                format!(
                    "embedding command failed (status {}): {}",
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            Error::dependency(SERVICE, format!("command output is not JSON: {}", e))
        })?;

        parse_vectors(parsed)
    }
}

/// Accepts `[[..], ..]` or an object with `embeddings`, `vectors` or `data`.
fn parse_vectors(parsed: Value) -> Result<Vec<Vec<f32>>> {
    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(mut obj) => ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .ok_or_else(|| {
                Error::dependency(SERVICE, "command output missing 'embeddings' field")
            })?,
        _ => {
            return Err(Error::dependency(
                SERVICE,
                "command output must be a JSON array or object",
            ))
        }
    };

    let rows = embeddings_value
        .as_array()
        .ok_or_else(|| Error::dependency(SERVICE, "embeddings must be a JSON array"))?;

    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| Error::dependency(SERVICE, "embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|v| v as f32)
                        .ok_or_else(|| Error::dependency(SERVICE, "embedding value must be a number"))
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.run_command(texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::dependency(
                SERVICE,
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}

/// Offline provider hashing word tokens into signed buckets.
///
/// Deterministic and dependency-free, so identical texts always embed to the
/// same unit vector. Tokens are the keyword tokens. Texts without any usable
/// token, or whose signed buckets cancel out, are refused rather than mapped
/// to a zero vector.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    max_chars: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hashing-{}", dimension),
            dimension: dimension.max(1),
            max_chars: usize::MAX,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = truncate_to_chars(text, self.max_chars).to_lowercase();

        let mut count = 0usize;
        for token in
            tokens(&lowered).filter(|t| t.chars().count() >= MIN_KEYWORD_LEN && !is_stop_word(t))
        {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            count += 1;
        }

        if count == 0 {
            return Err(Error::InvalidInput(
                "text has no tokens to embed".to_string(),
            ));
        }
        if is_zero_vector(&vector) {
            return Err(Error::InvalidInput(
                "text tokens cancel out to a zero vector".to_string(),
            ));
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        DEFAULT_COMMAND_BATCH_SIZE
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_text(text)).collect()
    }
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::similarity;

    #[test]
    fn test_hashing_provider_is_deterministic() {
        let mut provider = HashingProvider::new(64);
        assert_eq!(provider.model_id(), "hashing-64");

        let a = provider.embed_one("Engine fire after takeoff").unwrap();
        let b = provider.embed_one("Engine fire after takeoff").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hashing_provider_related_texts_score_higher() {
        let mut provider = HashingProvider::new(256);
        let query = provider.embed_one("engine fire warning on climb").unwrap();
        let related = provider.embed_one("engine fire warning during climb out").unwrap();
        let unrelated = provider.embed_one("passenger medical emergency diversion").unwrap();
        assert!(
            similarity(&query, &related).unwrap() > similarity(&query, &unrelated).unwrap()
        );
    }

    #[test]
    fn test_hashing_provider_refuses_empty_text() {
        let mut provider = HashingProvider::new(16);
        assert!(matches!(
            provider.embed_one("  the and  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_hashing_provider_refuses_cancelled_buckets() {
        let mut provider = HashingProvider::new(1);
        let words = [
            "engine", "runway", "approach", "windshield", "hydraulic", "turbulence",
            "altimeter", "propeller", "icing", "landing", "taxiway", "fuel",
        ];
        // With a single bucket every token lands on the same component, so
        // some pair of words with opposite signs sums to exactly zero.
        let cancelled = words.iter().enumerate().find_map(|(i, a)| {
            words[i + 1..].iter().find_map(|b| {
                let text = format!("{} {}", a, b);
                provider.embed_one(&text).is_err().then_some(text)
            })
        });
        let text = cancelled.expect("a pair with opposite signs");
        assert!(matches!(provider.embed_one(&text), Err(Error::InvalidInput(_))));
        assert_eq!(provider.embed_one("engine").unwrap(), provider.embed_one("engine").unwrap());
    }

    #[test]
    fn test_hashing_provider_keeps_accented_words() {
        let mut provider = HashingProvider::new(64);
        let a = provider.embed_one("dégivrage retardé").unwrap();
        let b = provider.embed_one("givrage retard").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_embed() {
        let mut provider = HashingProvider::new(16);
        assert!(provider.embed_texts(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_command_provider_parses_object_output() {
        let mut provider = CommandProvider::new(
            r#"cat >/dev/null; echo '{"embeddings": [[0.5, 0.5], [1, 0]]}'"#.to_string(),
            "test-model".to_string(),
        );
        let vectors = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_command_provider_failure_is_transient() {
        let mut provider =
            CommandProvider::new("cat >/dev/null; exit 1".to_string(), "m".to_string());
        assert!(provider.embed_one("text").unwrap_err().is_transient());
    }

    #[test]
    fn test_command_provider_timeout_is_transient() {
        let mut provider =
            CommandProvider::new("cat >/dev/null; exec sleep 5".to_string(), "m".to_string())
                .with_timeout(Duration::from_millis(200));
        assert!(provider.embed_one("text").unwrap_err().is_transient());
    }

    #[test]
    fn test_command_provider_garbage_is_permanent() {
        let mut provider =
            CommandProvider::new("cat >/dev/null; echo nope".to_string(), "m".to_string());
        let err = provider.embed_one("text").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_command_provider_count_mismatch() {
        let mut provider = CommandProvider::new(
            "cat >/dev/null; echo '[[1, 0]]'".to_string(),
            "m".to_string(),
        );
        assert!(provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .is_err());
    }

    #[test]
    fn test_http_provider_unreachable_is_transient() {
        let mut provider = HttpProvider::new(
            "http://127.0.0.1:9",
            "text-embedding-3-small",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(provider.embed_one("text").unwrap_err().is_transient());
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "hello";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("he".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
    }
}
