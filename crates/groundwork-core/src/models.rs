//! Core data models that flow through the indexing and retrieval pipeline.
//!
//! ```text
//! ContentItem ──chunk──▶ Chunk ──embed──▶ EmbeddingVector ──store──▶ VectorStore
//!                                                                     │
//!                            Answer ◀──chat── Chunk ◀──SearchResult ◀─┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic chunk IDs.
///
/// Chunk IDs are UUIDv5 values derived from
/// `(source_item_id, origin, chunk_index)` inside this namespace, so
/// re-chunking the same item yields the same IDs and re-indexing upserts
/// instead of duplicating.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f2c_1d0e_93a4_4b7e_8c55_2b1f_0d3e_7a91);

/// Where a chunk's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkOrigin {
    /// The item's own extracted content.
    Content,
    /// Supplementary documentation attached to the item.
    Docs,
}

impl ChunkOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkOrigin::Content => "content",
            ChunkOrigin::Docs => "docs",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "content" => Some(ChunkOrigin::Content),
            "docs" => Some(ChunkOrigin::Docs),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub origin: ChunkOrigin,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A bounded slice of an item's text with positional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_item_id: String,
    pub source_item_name: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Deterministic chunk ID for `(source_item_id, origin, chunk_index)`.
    pub fn deterministic_id(source_item_id: &str, origin: ChunkOrigin, chunk_index: usize) -> String {
        let key = format!("{}\u{1f}{}\u{1f}{}", source_item_id, origin.as_str(), chunk_index);
        Uuid::new_v5(&CHUNK_ID_NAMESPACE, key.as_bytes()).to_string()
    }
}

/// A chunk paired with its embedding vector.
///
/// The vector's dimension must match the store's configured dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub id: String,
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

impl EmbeddingVector {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            chunk_id: chunk.id.clone(),
            vector,
            chunk,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A ranked chunk returned by [`VectorStore::search`](crate::store::VectorStore::search).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// A raw item returned by a [`ContentProvider`](crate::content::ContentProvider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Stable reference used for scoping and lookups.
    pub reference: String,
    /// Human-readable name used to label context in prompts.
    pub name: String,
    /// Raw body text, before normalization.
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Result of answer composition.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Chunk>,
    pub model: String,
}

/// Counters produced by a full indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub items_total: usize,
    pub items_indexed: usize,
    pub items_failed: usize,
    pub chunks_stored: usize,
}

/// Snapshot of the orchestration service's indexing state.
#[derive(Debug, Clone, Serialize)]
pub struct IndexingStatus {
    pub in_progress: bool,
    pub last_index_time: Option<DateTime<Utc>>,
    pub vector_count: usize,
}
