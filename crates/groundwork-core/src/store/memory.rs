//! In-memory [`VectorStore`] for development, tests, and small corpora.
//!
//! Uses a `HashMap` keyed by vector ID behind `std::sync::RwLock`:
//! searches share the read lock, mutations take the write lock, and no
//! guard is held across an await point. Search is brute-force cosine
//! similarity, O(n) per query, which stays responsive up to roughly the
//! low tens of thousands of vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{EmbeddingVector, SearchResult};

use super::{rank_order, StoreKind, VectorStore};

/// Exact-search in-memory store.
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<String, EmbeddingVector>>,
    /// Fixed dimension; learned from the first stored vector when not configured.
    dims: RwLock<Option<usize>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            dims: RwLock::new(None),
        }
    }

    /// Create a store that only accepts vectors of `dims` dimensions.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            dims: RwLock::new(Some(dims)),
        }
    }

    fn read_vectors(&self) -> Result<RwLockReadGuard<'_, HashMap<String, EmbeddingVector>>> {
        self.vectors
            .read()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write_vectors(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, EmbeddingVector>>> {
        self.vectors
            .write()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn expected_dims(&self) -> Result<Option<usize>> {
        self.dims
            .read()
            .map(|d| *d)
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))
    }

    /// Check every vector against the store dimension, pinning it on first use.
    fn check_dims<'a>(&self, vectors: impl IntoIterator<Item = &'a EmbeddingVector>) -> Result<()> {
        let mut dims = self
            .dims
            .write()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))?;
        let mut expected = *dims;
        for v in vectors {
            match expected {
                Some(d) if d != v.dims() => {
                    return Err(RagError::DimensionMismatch {
                        expected: d,
                        actual: v.dims(),
                    })
                }
                Some(_) => {}
                None => expected = Some(v.dims()),
            }
        }
        *dims = expected;
        Ok(())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn store(&self, vector: EmbeddingVector) -> Result<()> {
        self.check_dims([&vector])?;
        self.write_vectors()?.insert(vector.id.clone(), vector);
        Ok(())
    }

    async fn store_batch(&self, vectors: Vec<EmbeddingVector>) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        // Validate the whole batch before touching the map.
        self.check_dims(&vectors)?;
        let count = vectors.len();
        let mut map = self.write_vectors()?;
        for v in vectors {
            map.insert(v.id.clone(), v);
        }
        tracing::debug!(count, "stored batch in memory");
        Ok(())
    }

    async fn replace_item(
        &self,
        source_item_id: &str,
        vectors: Vec<EmbeddingVector>,
    ) -> Result<()> {
        if vectors.iter().any(|v| v.chunk.source_item_id != source_item_id) {
            return Err(RagError::Storage(format!(
                "replacement for '{}' contains vectors of another item",
                source_item_id
            )));
        }
        self.check_dims(&vectors)?;
        let mut map = self.write_vectors()?;
        map.retain(|_, v| v.chunk.source_item_id != source_item_id);
        for v in vectors {
            map.insert(v.id.clone(), v);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if let Some(expected) = self.expected_dims()? {
            if expected != query.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let map = self.read_vectors()?;
        let mut results: Vec<SearchResult> = map
            .values()
            .filter(|v| scope_id.map_or(true, |s| v.chunk.source_item_id == s))
            .map(|v| SearchResult {
                chunk: v.chunk.clone(),
                similarity: cosine_similarity(query, &v.vector),
            })
            .collect();
        drop(map);

        results.sort_by(rank_order);
        results.truncate(top_k);
        Ok(results)
    }

    async fn clear(&self, scope_id: Option<&str>) -> Result<()> {
        let mut map = self.write_vectors()?;
        match scope_id {
            Some(scope) => map.retain(|_, v| v.chunk.source_item_id != scope),
            None => map.clear(),
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read_vectors()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata, ChunkOrigin};

    fn vector(item: &str, index: usize, content: &str, v: Vec<f32>) -> EmbeddingVector {
        let chunk = Chunk {
            id: Chunk::deterministic_id(item, ChunkOrigin::Content, index),
            source_item_id: item.to_string(),
            source_item_name: item.to_uppercase(),
            content: content.to_string(),
            metadata: ChunkMetadata {
                origin: ChunkOrigin::Content,
                chunk_index: index,
                total_chunks: 1,
            },
        };
        EmbeddingVector::new(chunk, v)
    }

    #[tokio::test]
    async fn test_search_ranked_and_truncated() {
        let store = InMemoryVectorStore::new();
        store
            .store_batch(vec![
                vector("a", 0, "east", vec![1.0, 0.0]),
                vector("a", 1, "north-east", vec![0.7, 0.7]),
                vector("b", 0, "north", vec![0.0, 1.0]),
                vector("c", 0, "west", vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.1], 3, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.content, "east");
        assert_eq!(results[1].chunk.content, "north-east");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        for r in &results {
            assert!((-1.0..=1.0).contains(&r.similarity));
        }
    }

    #[tokio::test]
    async fn test_scoped_search_ignores_better_match_elsewhere() {
        let store = InMemoryVectorStore::new();
        store.store(vector("a", 0, "weak", vec![0.1, 1.0])).await.unwrap();
        store.store(vector("b", 0, "strong", vec![1.0, 0.0])).await.unwrap();

        let results = store.search(&[1.0, 0.0], 5, Some("a")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source_item_id, "a");
    }

    #[tokio::test]
    async fn test_upsert_replaces_content() {
        let store = InMemoryVectorStore::new();
        store.store(vector("a", 0, "old", vec![1.0, 0.0])).await.unwrap();
        store.store(vector("a", 0, "new", vec![1.0, 0.0])).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results[0].chunk.content, "new");
    }

    #[tokio::test]
    async fn test_ties_ordered_by_chunk_id() {
        let store = InMemoryVectorStore::new();
        for i in 0..5 {
            store.store(vector("a", i, "same", vec![1.0, 1.0])).await.unwrap();
        }
        let results = store.search(&[1.0, 1.0], 5, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_whole_batch() {
        let store = InMemoryVectorStore::with_dims(2);
        let err = store
            .store_batch(vec![
                vector("a", 0, "ok", vec![1.0, 0.0]),
                vector("a", 1, "bad", vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(store.count().await.unwrap(), 0);

        let err = store.search(&[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_dimension_learned_from_first_vector() {
        let store = InMemoryVectorStore::new();
        store.store(vector("a", 0, "x", vec![1.0, 0.0, 0.0])).await.unwrap();
        let err = store.store(vector("a", 1, "y", vec![1.0])).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn test_zero_norm_vector_scores_zero() {
        let store = InMemoryVectorStore::new();
        store.store(vector("a", 0, "zero", vec![0.0, 0.0])).await.unwrap();
        let results = store.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_clear_scoped_and_full() {
        let store = InMemoryVectorStore::new();
        store.store(vector("a", 0, "a0", vec![1.0, 0.0])).await.unwrap();
        store.store(vector("a", 1, "a1", vec![1.0, 0.0])).await.unwrap();
        store.store(vector("b", 0, "b0", vec![0.0, 1.0])).await.unwrap();

        store.clear(Some("a")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.clear(None).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_item_drops_stale_chunks() {
        let store = InMemoryVectorStore::new();
        for i in 0..4 {
            store.store(vector("a", i, "old", vec![1.0, 0.0])).await.unwrap();
        }
        store.store(vector("b", 0, "other", vec![0.0, 1.0])).await.unwrap();

        store
            .replace_item("a", vec![vector("a", 0, "new", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        let scoped = store.search(&[1.0, 0.0], 10, Some("a")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].chunk.content, "new");

        store.replace_item("a", Vec::new()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_item_rejected_batch_keeps_old_set() {
        let store = InMemoryVectorStore::with_dims(2);
        store.store(vector("a", 0, "old", vec![1.0, 0.0])).await.unwrap();

        let err = store
            .replace_item("a", vec![vector("a", 0, "wide", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        let err = store
            .replace_item("a", vec![vector("b", 0, "foreign", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));

        let results = store.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.content, "old");
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = InMemoryVectorStore::new();
        assert!(store.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
    }
}
