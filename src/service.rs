//! Orchestration service: the single entry point for asking and indexing.
//!
//! [`RagService`] owns the retrieval strategy, the vector store, and the
//! indexing state. Full re-index runs are single-flight:
//!
//! ```text
//! trigger_index_all() ──CAS false→true──▶ spawn(strategy.index_all()) ──drop guard──▶ false + last_index_time
//!          └── CAS fails ─▶ logged, returns false, nothing runs
//! ```
//!
//! The guard resets the flag on every exit path, including errors and
//! panics in the indexing task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use groundwork_core::chunk::Chunker;
use groundwork_core::content::ContentProvider;
use groundwork_core::error::{RagError, Result};
use groundwork_core::models::{Answer, IndexReport, IndexingStatus};
use groundwork_core::store::VectorStore;
use groundwork_core::strategy::{AnswerRequest, RetrievalStrategy, StrategyDeps};

use crate::config::Config;
use crate::connector_fs::FilesystemProvider;
use crate::factory::{create_store, create_strategy};
use crate::provider::HttpProvider;

/// Per-question overrides. `None` fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub top_k: Option<usize>,
    pub scope_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Default)]
struct IndexingState {
    in_progress: AtomicBool,
    last_index_time: Mutex<Option<DateTime<Utc>>>,
}

impl IndexingState {
    /// Claim the single indexing slot, or `None` if a run is in progress.
    fn try_begin(self: &Arc<Self>) -> Option<IndexGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| IndexGuard {
                state: Arc::clone(self),
            })
    }

    fn last_index_time(&self) -> Option<DateTime<Utc>> {
        match self.last_index_time.lock() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

struct IndexGuard {
    state: Arc<IndexingState>,
}

impl Drop for IndexGuard {
    fn drop(&mut self) {
        let now = Utc::now();
        match self.state.last_index_time.lock() {
            Ok(mut t) => *t = Some(now),
            Err(poisoned) => *poisoned.into_inner() = Some(now),
        }
        self.state.in_progress.store(false, Ordering::Release);
    }
}

pub struct RagService {
    strategy: Arc<dyn RetrievalStrategy>,
    store: Arc<dyn VectorStore>,
    state: Arc<IndexingState>,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        strategy: Arc<dyn RetrievalStrategy>,
        store: Arc<dyn VectorStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            strategy,
            store,
            state: Arc::new(IndexingState::default()),
            default_top_k,
        }
    }

    /// Wire providers, store, and strategy from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let fs_config = config.content.filesystem.as_ref().ok_or_else(|| {
            RagError::config("[content.filesystem] is required to index content")
        })?;
        let content: Arc<dyn ContentProvider> = Arc::new(FilesystemProvider::new(fs_config)?);
        let provider = Arc::new(HttpProvider::new(&config.llm, config.store.dims)?);
        let chunker = Chunker::new(config.chunking.window_words, config.chunking.overlap_words)?;

        let store = create_store(&config.store, config.store.dims).await?;
        let strategy = create_strategy(
            config.retrieval.strategy,
            StrategyDeps {
                store: store.clone(),
                embedder: provider.clone(),
                chat: provider,
                content,
                chunker,
                batch_size: config.indexing.batch_size,
            },
        );

        tracing::info!(
            store = %store.kind(),
            strategy = %strategy.kind(),
            "service ready"
        );
        Ok(Self::new(strategy, store, config.retrieval.top_k))
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Answer `query` from retrieved context.
    pub async fn answer_question(&self, query: &str, options: AskOptions) -> Result<Answer> {
        let top_k = options.top_k.unwrap_or(self.default_top_k);
        tracing::debug!(top_k, scope = ?options.scope_id, "answering question");
        self.strategy
            .answer(AnswerRequest {
                query: query.to_string(),
                top_k,
                scope_id: options.scope_id,
                model: options.model,
                precomputed_context: None,
            })
            .await
    }

    /// Start a full re-index in the background.
    ///
    /// Returns `false` without doing anything when a run is already in
    /// progress. Must be called from within a tokio runtime.
    pub fn trigger_index_all(&self) -> bool {
        let Some(guard) = self.state.try_begin() else {
            tracing::info!("full index already in progress; trigger ignored");
            return false;
        };

        let strategy = Arc::clone(&self.strategy);
        tokio::spawn(async move {
            let _guard = guard;
            match strategy.index_all().await {
                Ok(report) => tracing::info!(
                    indexed = report.items_indexed,
                    failed = report.items_failed,
                    chunks = report.chunks_stored,
                    "background index finished"
                ),
                Err(e) => tracing::error!(error = %e, "background index failed"),
            }
        });
        true
    }

    /// Run a full re-index and wait for it.
    ///
    /// Returns `Ok(None)` when another run is already in progress.
    pub async fn index_all(&self) -> Result<Option<IndexReport>> {
        let Some(_guard) = self.state.try_begin() else {
            tracing::info!("full index already in progress; request ignored");
            return Ok(None);
        };
        self.strategy.index_all().await.map(Some)
    }

    /// Index one item synchronously; returns the number of chunks stored.
    pub async fn index_entity(&self, reference: &str) -> Result<usize> {
        self.strategy.index_entity(reference).await
    }

    pub async fn indexing_status(&self) -> Result<IndexingStatus> {
        Ok(IndexingStatus {
            in_progress: self.state.in_progress.load(Ordering::Acquire),
            last_index_time: self.state.last_index_time(),
            vector_count: self.store.count().await?,
        })
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
