//! Embedding capability contract and similarity helpers.
//!
//! The core never computes embeddings itself; it depends on the
//! [`Embedder`] trait, implemented by the application (OpenAI over HTTP,
//! or the deterministic offline embedder used for tests and demo mode).
//! Swapping implementations must not change any retrieval behavior other
//! than the similarity values themselves.

use anyhow::Result;
use async_trait::async_trait;

/// Capability contract for text embedding.
///
/// Implementations must be deterministic for identical text within a
/// single index generation, and `Send + Sync` so one instance can serve
/// concurrent queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;

    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
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

/// Map a cosine similarity into the `[0, 1]` relevance scale used by
/// retrieval scores.
pub fn unit_similarity(cos: f32) -> f64 {
    (((cos as f64) + 1.0) / 2.0).clamp(0.0, 1.0)
}
