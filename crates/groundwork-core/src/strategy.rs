//! Retrieval strategies: indexing, retrieval, and grounded answer composition.
//!
//! A [`RetrievalStrategy`] is the swappable capability the orchestration
//! service drives. [`StandardStrategy`] is the stock implementation:
//!
//! ```text
//! index:  ContentProvider ─▶ Chunker ─▶ Embedder (one call per item) ─▶ VectorStore::store_batch
//! answer: query ─▶ Embedder ─▶ VectorStore::search ─▶ system prompt ─▶ ChatModel
//! ```
//!
//! # Failure semantics
//!
//! | Operation | On error |
//! |-----------|----------|
//! | [`index_all`](RetrievalStrategy::index_all) | per-item errors logged and skipped |
//! | [`index_entity`](RetrievalStrategy::index_entity) | propagated |
//! | [`retrieve`](RetrievalStrategy::retrieve) | propagated |
//! | [`answer`](RetrievalStrategy::answer) | propagated; an empty retrieval falls back to an ungrounded call |

use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunker;
use crate::content::ContentProvider;
use crate::embedding::{embed_query, ensure_embeddings, Embedder};
use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{Answer, Chunk, ChunkOrigin, ContentItem, EmbeddingVector, IndexReport};
use crate::store::VectorStore;

pub const DEFAULT_BATCH_SIZE: usize = 10;

const GROUNDING_INSTRUCTIONS: &str = "You answer questions using only the context below. \
Each context entry is labeled with the item it came from. \
If the context does not contain the information needed to answer, say that you cannot answer \
from the available context instead of guessing.";

/// Names the available strategy implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Standard,
}

impl FromStr for StrategyKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(StrategyKind::Standard),
            other => Err(RagError::config(format!(
                "unknown retrieval strategy '{}'; available: standard",
                other
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Standard => f.write_str("standard"),
        }
    }
}

/// Collaborators handed to a strategy at construction.
#[derive(Clone)]
pub struct StrategyDeps {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub content: Arc<dyn ContentProvider>,
    pub chunker: Chunker,
    /// Items indexed concurrently per batch during `index_all`.
    pub batch_size: usize,
}

/// Inputs for [`RetrievalStrategy::answer`].
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub query: String,
    pub top_k: usize,
    pub scope_id: Option<String>,
    pub model: Option<String>,
    /// Already-retrieved context; when present, retrieval is skipped.
    pub precomputed_context: Option<Vec<Chunk>>,
}

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Clear the store and index every item the content provider returns.
    async fn index_all(&self) -> Result<IndexReport>;

    /// Index one item, replacing its previous chunks; returns the number
    /// of chunks stored.
    async fn index_entity(&self, reference: &str) -> Result<usize>;

    /// Top-K chunks for `query`, optionally limited to one source item.
    async fn retrieve(&self, query: &str, top_k: usize, scope_id: Option<&str>)
        -> Result<Vec<Chunk>>;

    async fn answer(&self, request: AnswerRequest) -> Result<Answer>;
}

/// Chunk → embed → store indexing with single-prompt answer composition.
pub struct StandardStrategy {
    deps: StrategyDeps,
}

impl StandardStrategy {
    pub fn new(deps: StrategyDeps) -> Self {
        Self { deps }
    }

    fn batch_size(&self) -> usize {
        self.deps.batch_size.max(1)
    }

    /// Chunk, embed and store one item. Returns the number of chunks stored.
    ///
    /// With `replace`, the item's previous chunk set is swapped out
    /// atomically, so chunks that no longer exist are dropped.
    async fn index_item(&self, item: &ContentItem, replace: bool) -> Result<usize> {
        let content = &self.deps.content;
        let reference = content.item_ref(item);
        let text = content.extract_item_content(item);

        let mut chunks =
            self.deps
                .chunker
                .chunk(&text, &reference, &item.name, ChunkOrigin::Content);

        if content.has_supplementary_docs(&reference).await? {
            if let Some(docs) = content.fetch_supplementary_docs(&reference).await? {
                chunks.extend(
                    self.deps
                        .chunker
                        .chunk(&docs, &reference, &item.name, ChunkOrigin::Docs),
                );
            }
        }

        if chunks.is_empty() {
            tracing::debug!(item = %reference, "item produced no chunks");
            if replace {
                self.deps.store.replace_item(&reference, Vec::new()).await?;
            }
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = ensure_embeddings(chunks.len(), self.deps.embedder.embed(&texts).await?)?;

        let batch: Vec<EmbeddingVector> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingVector::new(chunk, vector))
            .collect();
        let stored = batch.len();
        if replace {
            self.deps.store.replace_item(&reference, batch).await?;
        } else {
            self.deps.store.store_batch(batch).await?;
        }

        tracing::debug!(item = %reference, chunks = stored, "indexed item");
        Ok(stored)
    }
}

#[async_trait]
impl RetrievalStrategy for StandardStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Standard
    }

    async fn index_all(&self) -> Result<IndexReport> {
        self.deps.store.clear(None).await?;
        let items = self.deps.content.fetch_all_items().await?;

        let mut report = IndexReport {
            items_total: items.len(),
            ..Default::default()
        };
        tracing::info!(
            items = items.len(),
            batch_size = self.batch_size(),
            "full index started"
        );

        for batch in items.chunks(self.batch_size()) {
            let outcomes = join_all(batch.iter().map(|item| self.index_item(item, false))).await;
            for (item, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(stored) => {
                        report.items_indexed += 1;
                        report.chunks_stored += stored;
                    }
                    Err(e) => {
                        report.items_failed += 1;
                        tracing::warn!(
                            item = %self.deps.content.item_ref(item),
                            error = %e,
                            "skipping item that failed to index"
                        );
                    }
                }
            }
        }

        tracing::info!(
            indexed = report.items_indexed,
            failed = report.items_failed,
            chunks = report.chunks_stored,
            "full index finished"
        );
        Ok(report)
    }

    async fn index_entity(&self, reference: &str) -> Result<usize> {
        let item = self.deps.content.fetch_item(reference).await?;
        self.index_item(&item, true).await
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let query_vector = embed_query(self.deps.embedder.as_ref(), query).await?;
        let results = self.deps.store.search(&query_vector, top_k, scope_id).await?;
        tracing::debug!(results = results.len(), top_k, scope = ?scope_id, "retrieved context");
        Ok(results.into_iter().map(|r| r.chunk).collect())
    }

    async fn answer(&self, request: AnswerRequest) -> Result<Answer> {
        let AnswerRequest {
            query,
            top_k,
            scope_id,
            model,
            precomputed_context,
        } = request;

        let sources = match precomputed_context {
            Some(chunks) => chunks,
            None => self.retrieve(&query, top_k, scope_id.as_deref()).await?,
        };
        let model_name = model
            .clone()
            .unwrap_or_else(|| self.deps.chat.default_model().to_string());

        if sources.is_empty() {
            tracing::info!("no context retrieved, answering without grounding");
            let answer = self
                .deps
                .chat
                .chat(&[ChatMessage::user(query)], model.as_deref())
                .await?;
            return Ok(Answer {
                answer,
                sources: Vec::new(),
                model: model_name,
            });
        }

        let messages = [
            ChatMessage::system(build_context_prompt(&sources)),
            ChatMessage::user(query),
        ];
        let answer = self.deps.chat.chat(&messages, model.as_deref()).await?;

        Ok(Answer {
            answer,
            sources,
            model: model_name,
        })
    }
}

/// Build the grounding system message from retrieved chunks.
pub fn build_context_prompt(chunks: &[Chunk]) -> String {
    let mut prompt = String::from(GROUNDING_INSTRUCTIONS);
    prompt.push_str("\n\nContext:\n");
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n[{}] {} (item: {}, origin: {})\n{}\n",
            i + 1,
            chunk.source_item_name,
            chunk.source_item_id,
            chunk.metadata.origin,
            chunk.content
        );
    }
    prompt
}
