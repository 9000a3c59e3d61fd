//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for similarity computation and response validation.
//!
//! Concrete HTTP-backed embedders live in the `groundwork` app crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Converts text into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order. Use [`ensure_embeddings`] on every response before returning it.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts.
    ///
    /// # Errors
    ///
    /// [`RagError::Provider`] when the upstream call fails or the payload is
    /// malformed. Implementations do not retry.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper for query-time use: a one-element batch call.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| RagError::Provider("empty embedding response".to_string()))
}

/// Validate an embedding response against the request.
///
/// Rejects a response whose length differs from `expected` or that
/// contains an empty vector.
pub fn ensure_embeddings(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(RagError::Provider(format!(
            "embedding count mismatch: sent {} texts, received {} vectors",
            expected,
            vectors.len()
        )));
    }
    if let Some(pos) = vectors.iter().position(|v| v.is_empty()) {
        return Err(RagError::Provider(format!(
            "embedding response contains an empty vector at position {}",
            pos
        )));
    }
    Ok(vectors)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and any
/// zero-norm vector.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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

    // Rounding can push identical vectors a hair past 1.0.
    (dot / denom).clamp(-1.0, 1.0)
}
