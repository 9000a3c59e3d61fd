//! # Groundwork Core
//!
//! Runtime-agnostic building blocks for retrieval-augmented generation:
//! data models, the chunker, the embedding and chat traits, the vector
//! store contract with its in-memory backend, and the retrieval strategy.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The `groundwork` app crate supplies the persistent store, HTTP
//! providers, and the orchestration service on top of it.

pub mod chunk;
pub mod content;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod store;
pub mod strategy;

pub use error::{RagError, Result};
