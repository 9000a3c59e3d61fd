//! Vector storage abstraction for Groundwork.
//!
//! The [`VectorStore`] trait is the single contract the retrieval strategy
//! talks to. Two backends implement it:
//!
//! | Backend | Search | Crate |
//! |---------|--------|-------|
//! | [`memory::InMemoryVectorStore`] | exact, brute-force cosine | `groundwork-core` |
//! | `PgVectorStore` | approximate, HNSW over pgvector | `groundwork` |
//!
//! Callers never branch on the backend; the factory picks one from config.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{EmbeddingVector, SearchResult};

/// Discriminates the two store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Persistent,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Memory => f.write_str("memory"),
            StoreKind::Persistent => f.write_str("persistent"),
        }
    }
}

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`store`](VectorStore::store) | Upsert one vector |
/// | [`store_batch`](VectorStore::store_batch) | Upsert many vectors, all-or-nothing |
/// | [`replace_item`](VectorStore::replace_item) | Swap one item's vectors for a new set, atomically |
/// | [`search`](VectorStore::search) | Top-K by cosine similarity, optionally scoped to one item |
/// | [`clear`](VectorStore::clear) | Delete everything, or one item's vectors |
/// | [`count`](VectorStore::count) | Number of stored vectors |
/// | [`close`](VectorStore::close) | Release resources |
///
/// # Contract
///
/// - Upserts are keyed on `(chunk.source_item_id, chunk_id)`; re-storing
///   replaces the previous entry.
/// - `replace_item` leaves either the old or the new chunk set for that
///   item, never a mix.
/// - `search` returns at most `top_k` results in non-increasing similarity
///   order, each similarity in `[-1, 1]`. Equal similarities are ordered by
///   chunk ID ascending.
/// - Vectors whose dimension disagrees with the store's dimension are
///   rejected with [`RagError::DimensionMismatch`](crate::error::RagError::DimensionMismatch).
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn store(&self, vector: EmbeddingVector) -> Result<()>;

    async fn store_batch(&self, vectors: Vec<EmbeddingVector>) -> Result<()>;

    /// Delete every vector of `source_item_id`, then store `vectors`.
    async fn replace_item(&self, source_item_id: &str, vectors: Vec<EmbeddingVector>)
        -> Result<()>;

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<SearchResult>>;

    async fn clear(&self, scope_id: Option<&str>) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Release held resources. The default does nothing.
    async fn close(&self) {}
}

/// Ranking order shared by every backend: similarity descending, then
/// chunk ID ascending.
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
