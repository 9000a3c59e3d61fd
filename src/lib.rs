//! # Groundwork
//!
//! Retrieval-augmented question answering over a content corpus.
//!
//! Groundwork chunks each content item, embeds the chunks, stores the
//! vectors in an in-memory or pgvector-backed store, and answers questions
//! with an LLM grounded in the top-K most similar chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────────┐
//! │   Content    │──▶│    Strategy     │──▶│   VectorStore    │
//! │  Filesystem  │   │ Chunk+Embed+Ask │   │ memory│pgvector  │
//! └──────────────┘   └────────┬────────┘   └──────────────────┘
//!                             │
//!                    ┌────────┴────────┐
//!                    ▼                 ▼
//!              ┌──────────┐     ┌──────────────┐
//!              │ CLI (gw) │     │ HTTP provider│
//!              └──────────┘     │ OpenAI/Ollama│
//!                               └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gw init                                   # create the pgvector schema
//! gw index                                  # index every item
//! gw ask "Which service handles payments?"
//! gw status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | Tracing subscriber setup |
//! | [`connector_fs`] | Filesystem content provider |
//! | [`provider`] | OpenAI / Ollama embedding and chat over HTTP |
//! | [`pg_store`] | Persistent pgvector store |
//! | [`factory`] | Store and strategy construction |
//! | [`service`] | Orchestration: ask, index, status |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! The runtime-agnostic pieces (models, chunker, traits, in-memory store,
//! strategy) live in `groundwork-core`.

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod factory;
pub mod logging;
pub mod migrate;
pub mod pg_store;
pub mod provider;
pub mod service;
