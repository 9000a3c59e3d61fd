//! End-to-end scenarios for `RagService` over the in-memory store.
//!
//! The embedding model, chat model and content source are deterministic
//! in-process doubles, so these tests need no network.

use async_trait::async_trait;
use groundwork::factory::create_strategy;
use groundwork::service::{AskOptions, RagService};
use groundwork_core::chunk::Chunker;
use groundwork_core::content::ContentProvider;
use groundwork_core::embedding::Embedder;
use groundwork_core::error::{RagError, Result};
use groundwork_core::llm::{ChatMessage, ChatModel};
use groundwork_core::models::{Answer, Chunk, ContentItem, IndexReport};
use groundwork_core::store::memory::InMemoryVectorStore;
use groundwork_core::store::VectorStore;
use groundwork_core::strategy::{
    AnswerRequest, RetrievalStrategy, StrategyDeps, StrategyKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const DIMS: usize = 32;

// ─── Test doubles ───────────────────────────────────────────────────

/// Bag-of-words embedder: every word increments one hashed bucket.
#[derive(Default)]
struct HashEmbedder {
    calls: AtomicUsize,
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split_whitespace() {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        let h = word
            .bytes()
            .fold(17usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        v[h % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bag"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Answers with the number of messages and the length of the system prompt.
struct EchoChat;

#[async_trait]
impl ChatModel for EchoChat {
    fn default_model(&self) -> &str {
        "echo-1"
    }
    async fn chat(&self, messages: &[ChatMessage], _model: Option<&str>) -> Result<String> {
        Ok(format!("echo: {} message(s)", messages.len()))
    }
}

/// In-memory content source. When `gate` is set, `fetch_all_items` waits
/// for it before returning.
struct MemoryContent {
    items: Vec<ContentItem>,
    gate: Option<Arc<Notify>>,
}

impl MemoryContent {
    fn new(items: &[(&str, &str, &str)]) -> Self {
        Self {
            items: items
                .iter()
                .map(|(reference, name, body)| ContentItem {
                    reference: reference.to_string(),
                    name: name.to_string(),
                    body: body.to_string(),
                    metadata: serde_json::Value::Null,
                })
                .collect(),
            gate: None,
        }
    }
}

#[async_trait]
impl ContentProvider for MemoryContent {
    async fn fetch_all_items(&self) -> Result<Vec<ContentItem>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.items.clone())
    }

    async fn fetch_item(&self, reference: &str) -> Result<ContentItem> {
        self.items
            .iter()
            .find(|i| i.reference == reference)
            .cloned()
            .ok_or_else(|| RagError::NotFound(reference.to_string()))
    }
}

struct Fixture {
    service: RagService,
    store: Arc<InMemoryVectorStore>,
    embedder: Arc<HashEmbedder>,
}

fn fixture(content: MemoryContent) -> Fixture {
    let store = Arc::new(InMemoryVectorStore::with_dims(DIMS));
    let embedder = Arc::new(HashEmbedder::default());
    let strategy = create_strategy(
        StrategyKind::Standard,
        StrategyDeps {
            store: store.clone(),
            embedder: embedder.clone(),
            chat: Arc::new(EchoChat),
            content: Arc::new(content),
            chunker: Chunker::new(10, 2).unwrap(),
            batch_size: 4,
        },
    );
    Fixture {
        service: RagService::new(strategy, store.clone(), 5),
        store,
        embedder,
    }
}

fn catalog() -> MemoryContent {
    MemoryContent::new(&[
        ("payments", "Payments API", "Service X handles payments and refunds for every order."),
        ("mailer", "Mailer", "Service Y sends transactional email and newsletters to customers."),
        ("search", "Search", "Service Z indexes products and answers search queries quickly."),
    ])
}

async fn wait_until_idle(service: &RagService) {
    for _ in 0..200 {
        if !service.indexing_status().await.unwrap().in_progress {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("indexing never finished");
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_corpus() {
    let f = fixture(MemoryContent::new(&[]));

    let report = f.service.index_all().await.unwrap().unwrap();
    assert_eq!(report, IndexReport::default());
    assert_eq!(f.store.count().await.unwrap(), 0);

    let answer = f
        .service
        .answer_question("anything", AskOptions::default())
        .await
        .unwrap();
    assert!(!answer.answer.is_empty());
    assert!(answer.sources.is_empty());
    assert_eq!(answer.answer, "echo: 1 message(s)");
}

#[tokio::test]
async fn test_index_and_answer_with_sources() {
    let f = fixture(catalog());
    let report = f.service.index_all().await.unwrap().unwrap();
    assert_eq!(report.items_indexed, 3);
    assert_eq!(report.chunks_stored, f.store.count().await.unwrap());

    let answer = f
        .service
        .answer_question(
            "Which service handles payments and refunds?",
            AskOptions {
                top_k: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(answer.answer, "echo: 2 message(s)");
    assert_eq!(answer.model, "echo-1");
    assert!(answer.sources.len() <= 2);
    assert_eq!(answer.sources[0].source_item_id, "payments");
}

#[tokio::test]
async fn test_single_item_single_chunk() {
    let f = fixture(MemoryContent::new(&[(
        "svc-x",
        "Service X",
        "Service X handles payments.",
    )]));
    f.service.index_all().await.unwrap();

    let query = embed_text("Service X handles payments.");
    let results = f.store.search(&query, 1, None).await.unwrap();
    assert_eq!(results.len(), 1);
    let chunk = &results[0].chunk;
    assert_eq!(chunk.metadata.chunk_index, 0);
    assert_eq!(chunk.metadata.total_chunks, 1);
    assert_eq!(chunk.id, Chunk::deterministic_id("svc-x", chunk.metadata.origin, 0));
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_scoped_question() {
    let f = fixture(catalog());
    f.service.index_all().await.unwrap();

    let answer = f
        .service
        .answer_question(
            "Which service handles payments?",
            AskOptions {
                top_k: Some(5),
                scope_id: Some("mailer".to_string()),
                model: Some("override".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(answer.model, "override");
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|c| c.source_item_id == "mailer"));
}

#[tokio::test]
async fn test_index_entity_and_not_found() {
    let f = fixture(catalog());

    let stored = f.service.index_entity("search").await.unwrap();
    assert_eq!(stored, f.store.count().await.unwrap());

    // re-indexing the same item upserts in place
    f.service.index_entity("search").await.unwrap();
    assert_eq!(stored, f.store.count().await.unwrap());

    let err = f.service.index_entity("nope").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(ref r) if r == "nope"));
}

#[tokio::test]
async fn test_concurrent_index_all_is_single_flight() {
    let gate = Arc::new(Notify::new());
    let mut content = catalog();
    content.gate = Some(gate.clone());
    let f = fixture(content);

    assert!(f.service.trigger_index_all());
    let status = f.service.indexing_status().await.unwrap();
    assert!(status.in_progress);
    assert!(status.last_index_time.is_none());

    // Second trigger and an awaited run are both no-ops while the first runs.
    assert!(!f.service.trigger_index_all());
    assert!(f.service.index_all().await.unwrap().is_none());
    assert!(f.service.indexing_status().await.unwrap().in_progress);

    gate.notify_one();
    wait_until_idle(&f.service).await;

    let status = f.service.indexing_status().await.unwrap();
    assert!(!status.in_progress);
    assert!(status.last_index_time.is_some());
    assert_eq!(status.vector_count, f.store.count().await.unwrap());
    // one embed call per item, from a single run
    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 3);
}

/// A strategy whose full index panics.
struct PanickingStrategy;

#[async_trait]
impl RetrievalStrategy for PanickingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Standard
    }
    async fn index_all(&self) -> Result<IndexReport> {
        panic!("boom");
    }
    async fn index_entity(&self, _reference: &str) -> Result<usize> {
        Ok(0)
    }
    async fn retrieve(&self, _q: &str, _k: usize, _s: Option<&str>) -> Result<Vec<Chunk>> {
        Ok(Vec::new())
    }
    async fn answer(&self, _request: AnswerRequest) -> Result<Answer> {
        Err(RagError::Provider("unused".to_string()))
    }
}

#[tokio::test]
async fn test_guard_released_after_panic() {
    let service = RagService::new(
        Arc::new(PanickingStrategy),
        Arc::new(InMemoryVectorStore::new()),
        5,
    );

    assert!(service.trigger_index_all());
    wait_until_idle(&service).await;

    let status = service.indexing_status().await.unwrap();
    assert!(!status.in_progress);
    assert!(status.last_index_time.is_some());
    // the slot is free again
    assert!(service.trigger_index_all());
    wait_until_idle(&service).await;
}

#[tokio::test]
async fn test_full_index_replaces_previous_run() {
    let f = fixture(catalog());
    f.service.index_all().await.unwrap();
    let first = f.store.count().await.unwrap();

    f.service.index_all().await.unwrap();
    assert_eq!(f.store.count().await.unwrap(), first);
}
