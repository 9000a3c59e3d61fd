//! Store and strategy construction from configuration.

use std::sync::Arc;

use groundwork_core::error::{RagError, Result};
use groundwork_core::store::memory::InMemoryVectorStore;
use groundwork_core::store::{StoreKind, VectorStore};
use groundwork_core::strategy::{RetrievalStrategy, StandardStrategy, StrategyDeps, StrategyKind};

use crate::config::StoreConfig;
use crate::pg_store::PgVectorStore;

/// Build the configured vector store.
///
/// A persistent store that fails to initialize falls back to an in-memory
/// store with a warning, unless `store.strict` is set. Missing persistent
/// settings are a configuration error and never fall back.
pub async fn create_store(config: &StoreConfig, dims: usize) -> Result<Arc<dyn VectorStore>> {
    match config.kind {
        StoreKind::Memory => {
            tracing::info!(dims, "using in-memory vector store");
            Ok(Arc::new(InMemoryVectorStore::with_dims(dims)))
        }
        StoreKind::Persistent => {
            let persistent = config.persistent.clone().ok_or_else(|| {
                RagError::config("[store.persistent] is required when store.type is 'persistent'")
            })?;
            // Resolve now so a missing URL is reported instead of falling back.
            persistent.resolve_url()?;

            let store = PgVectorStore::new(persistent, dims)?;
            match store.initialize().await {
                Ok(()) => Ok(Arc::new(store)),
                Err(e) if config.strict => Err(e),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "persistent vector store unavailable, falling back to in-memory store"
                    );
                    Ok(Arc::new(InMemoryVectorStore::with_dims(dims)))
                }
            }
        }
    }
}

pub fn create_strategy(kind: StrategyKind, deps: StrategyDeps) -> Arc<dyn RetrievalStrategy> {
    match kind {
        StrategyKind::Standard => Arc::new(StandardStrategy::new(deps)),
    }
}
