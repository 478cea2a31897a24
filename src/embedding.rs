//! Embedding provider abstraction.
//!
//! The embedding service itself is an external collaborator
//! (`SPEC_FULL.md` §5/§9 — bulkheaded, not reimplemented or trained
//! here); this module defines the [`EmbeddingProvider`] trait plus two
//! concrete backends (`OpenAIProvider`, `OllamaProvider`) and the
//! no-op [`DisabledProvider`], along with the vector utilities the
//! storage and ranking layers need to read/write embeddings as SQLite
//! BLOBs and compare them.
//!
//! # Retry strategy
//!
//! Each provider makes one HTTP attempt per call and classifies the
//! outcome into a [`CoreError`]: connection errors, 429, and 5xx map to
//! `CoreError::Transient`/`RateLimited` (retryable); other 4xx and a
//! malformed response body map to `CoreError::Fatal` (not retried — a
//! malformed response won't fix itself on retry). [`embed_texts`] runs
//! that single attempt through the resilience layer's `EMBEDDING`
//! profile (`ctx.resilience.execute(Profile::Embedding, ...)`), which
//! supplies the actual retry/backoff, circuit breaking, and bulkheading
//! — this module has no retry loop of its own.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::CoreError;
use crate::resilience::{Profile, ResilientExecutor};

/// Metadata surface for an embedding backend. Embedding computation
/// itself is a free function ([`embed_texts`]) because async trait
/// objects would need boxed futures for no benefit here — dispatch is
/// config-driven, not polymorphic over many call sites.
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider. Each call
/// makes one HTTP attempt under `Profile::Embedding`; the resilience
/// layer supplies retry, circuit-breaking, and bulkheading around it.
pub async fn embed_texts(
    _provider: &dyn EmbeddingProvider,
    resilience: &ResilientExecutor,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => Ok(resilience
            .execute(Profile::Embedding, "embed_openai", || {
                embed_openai(config, texts)
            })
            .await?),
        "ollama" => Ok(resilience
            .execute(Profile::Embedding, "embed_ollama", || {
                embed_ollama(config, texts)
            })
            .await?),
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    resilience: &ResilientExecutor,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, resilience, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// No-op provider used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

/// Embedding provider using the OpenAI-compatible embeddings API.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// One OpenAI embeddings request, no retry — the caller's
/// `ResilientExecutor` owns retry/backoff.
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| CoreError::fatal("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| CoreError::fatal("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CoreError::fatal(e.to_string()))?;

    let body = serde_json::json!({ "model": model, "input": texts });

    let response = client
        .post("https://api.openai.com/v1/embeddings")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| CoreError::transient("embed_openai", e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::fatal(format!("malformed OpenAI response body: {e}")))?;
        return parse_embeddings_response(&json).map_err(|e| CoreError::fatal(e.to_string()));
    }
    if status.as_u16() == 429 {
        return Err(CoreError::RateLimited {
            operation: "embed_openai".to_string(),
        });
    }
    if status.is_server_error() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(CoreError::transient(
            "embed_openai",
            format!("{status}: {body_text}"),
        ));
    }
    let body_text = response.text().await.unwrap_or_default();
    Err(CoreError::fatal(format!(
        "OpenAI API error {status}: {body_text}"
    )))
}

/// Embedding provider using a local Ollama instance's `/api/embed`.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            dims,
            base_url,
        })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// One pass over `texts` against Ollama's `/api/embed`, one request per
/// text, no retry — the caller's `ResilientExecutor` owns retry/backoff
/// for the batch as a whole. A failure partway through re-embeds
/// already-succeeded texts on the next attempt; Ollama has no batch
/// embeddings endpoint, so there is no cheaper unit to retry at.
async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| CoreError::fatal("embedding.model required"))?;
    let base_url =
        std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CoreError::fatal(e.to_string()))?;

    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
        let body = serde_json::json!({ "model": model, "input": text });
        let response = client
            .post(format!("{base_url}/api/embed"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::transient("embed_ollama", e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| CoreError::fatal(format!("malformed Ollama response body: {e}")))?;
            let vec = json
                .get("embeddings")
                .and_then(|e| e.as_array())
                .and_then(|a| a.first())
                .and_then(|v| v.as_array())
                .ok_or_else(|| CoreError::fatal("invalid Ollama response: missing embeddings"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            out.push(vec);
            continue;
        }
        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited {
                operation: "embed_ollama".to_string(),
            });
        }
        if status.is_server_error() {
            return Err(CoreError::transient("embed_ollama", format!("status {status}")));
        }
        return Err(CoreError::fatal(format!("Ollama error {status}")));
    }
    Ok(out)
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a little-endian BLOB for SQLite storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors
/// or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// `1 − cos_distance` clamped to `[0,1]`, the `vector_score` signal
/// (`SPEC_FULL.md` §4.4).
pub fn vector_score(query: &[f32], row: &[f32]) -> f32 {
    let cos_distance = 1.0 - cosine_similarity(query, row);
    (1.0 - cos_distance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn vector_score_identical_is_one() {
        let v = vec![1.0, 0.0];
        assert!((vector_score(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_score_clamped_nonnegative() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert_eq!(vector_score(&a, &b), 0.0);
    }
}
