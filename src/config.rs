//! TOML configuration for the `gw` binary and the [`RagService`](crate::service::RagService).
//!
//! Every section except `[llm]` has defaults, so a minimal file only needs
//! the provider settings and a content root. See `config/groundwork.example.toml`.

use anyhow::{Context, Result};
use groundwork_core::chunk::{DEFAULT_OVERLAP_WORDS, DEFAULT_WINDOW_WORDS};
use groundwork_core::error::RagError;
use groundwork_core::store::StoreKind;
use groundwork_core::strategy::{StrategyKind, DEFAULT_BATCH_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_words")]
    pub window_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

fn default_window_words() -> usize {
    DEFAULT_WINDOW_WORDS
}
fn default_overlap_words() -> usize {
    DEFAULT_OVERLAP_WORDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Standard,
            top_k: 5,
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// Discriminated store configuration consumed by
/// [`create_store`](crate::factory::create_store).
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(rename = "type", default = "default_store_kind")]
    pub kind: StoreKind,
    /// Propagate persistent-store initialization failures instead of
    /// falling back to memory.
    #[serde(default)]
    pub strict: bool,
    /// Embedding dimension; must match the embedding model.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub persistent: Option<PersistentStoreConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            strict: false,
            dims: default_dims(),
            persistent: None,
        }
    }
}

fn default_store_kind() -> StoreKind {
    StoreKind::Memory
}
fn default_dims() -> usize {
    1536
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistentStoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// Name of an environment variable holding the connection URL.
    #[serde(default)]
    pub url_env: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_table() -> String {
    "groundwork_embeddings".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    600
}

impl PersistentStoreConfig {
    /// Resolve the connection URL from `url`, falling back to `url_env`.
    pub fn resolve_url(&self) -> Result<String, RagError> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.clone());
        }
        match &self.url_env {
            Some(var) => std::env::var(var).map_err(|_| {
                RagError::config(format!(
                    "store.persistent.url_env names '{}', which is not set",
                    var
                ))
            }),
            None => Err(RagError::config(
                "store.persistent requires url or url_env",
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Openai,
    Ollama,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub chat_model: String,
    pub embedding_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, LlmProviderKind::Openai) => "https://api.openai.com/v1",
            (None, LlmProviderKind::Ollama) => "http://localhost:11434",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentConfig {
    pub filesystem: Option<FilesystemContentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemContentConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_docs_suffix")]
    pub docs_suffix: String,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}
fn default_docs_suffix() -> String {
    ".docs.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the daily-rolling log file. Stderr only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunking.window_words == 0 {
            return Err(RagError::config("chunking.window_words must be > 0"));
        }
        if self.chunking.overlap_words >= self.chunking.window_words {
            return Err(RagError::config(
                "chunking.overlap_words must be smaller than chunking.window_words",
            ));
        }
        if self.indexing.batch_size == 0 {
            return Err(RagError::config("indexing.batch_size must be > 0"));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::config("retrieval.top_k must be >= 1"));
        }
        if self.store.dims == 0 {
            return Err(RagError::config("store.dims must be > 0"));
        }
        if self.store.kind == StoreKind::Persistent {
            let persistent = self.store.persistent.as_ref().ok_or_else(|| {
                RagError::config("[store.persistent] is required when store.type is 'persistent'")
            })?;
            validate_identifier(&persistent.table)?;
            if persistent.max_connections == 0 {
                return Err(RagError::config(
                    "store.persistent.max_connections must be > 0",
                ));
            }
        }
        if self.llm.chat_model.trim().is_empty() {
            return Err(RagError::config("llm.chat_model must not be empty"));
        }
        if self.llm.embedding_model.trim().is_empty() {
            return Err(RagError::config("llm.embedding_model must not be empty"));
        }
        Ok(())
    }
}

/// Accept only plain SQL identifiers (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes).
///
/// Table names are interpolated into SQL, so anything else is rejected.
pub fn validate_identifier(name: &str) -> Result<(), RagError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || name.len() > 63 {
        return Err(RagError::config(format!(
            "'{}' is not a valid table name; use letters, digits and underscores",
            name
        )));
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
