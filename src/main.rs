//! # Groundwork CLI (`gw`)
//!
//! Index a content corpus and ask questions grounded in it.
//!
//! ## Usage
//!
//! ```bash
//! gw --config ./config/groundwork.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the pgvector extension, table and indexes |
//! | `gw index` | Re-index every content item |
//! | `gw index --item <ref>` | Index a single item |
//! | `gw ask "<question>"` | Answer a question from retrieved context |
//! | `gw status` | Show indexing status and vector count |
//!
//! With `store.type = "memory"` nothing survives the process, so `gw ask`
//! indexes the corpus first when the store is empty.

use anyhow::Context;
use clap::{Parser, Subcommand};
use groundwork::config::{self, Config};
use groundwork::service::{AskOptions, RagService};
use groundwork::{factory, logging, migrate};
use groundwork_core::models::{Answer, IndexingStatus};
use groundwork_core::store::StoreKind;
use std::path::PathBuf;

/// Groundwork CLI: retrieval-augmented answers over your own content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/groundwork.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Groundwork: retrieval-augmented answers over your own content",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/groundwork.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the persistent store schema.
    ///
    /// Idempotent. Does nothing when the store type is `memory`.
    Init,

    /// Index content into the vector store.
    ///
    /// Without `--item`, clears the store and re-indexes every item.
    Index {
        /// Reference of a single item to (re-)index.
        #[arg(long)]
        item: Option<String>,
    },

    /// Ask a question.
    Ask {
        /// The question.
        query: String,

        /// Number of chunks to retrieve (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict retrieval to one item reference.
        #[arg(long)]
        scope: Option<String>,

        /// Override the chat model.
        #[arg(long)]
        model: Option<String>,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the store type and the number of stored vectors.
    ///
    /// Connects to the store only; no content or LLM settings are used.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Schema ready.");
        }
        Commands::Index { item } => {
            let service = RagService::from_config(&cfg).await?;
            let result = run_index(&service, item.as_deref()).await;
            service.close().await;
            result?;
        }
        Commands::Ask {
            query,
            top_k,
            scope,
            model,
            json,
        } => {
            let service = RagService::from_config(&cfg).await?;
            let options = AskOptions {
                top_k,
                scope_id: scope,
                model,
            };
            let result = run_ask(&service, &cfg, &query, options).await;
            service.close().await;
            let answer = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Status => {
            // Only the store is needed; content and LLM settings may be absent.
            let store = factory::create_store(&cfg.store, cfg.store.dims).await?;
            let count = store.count().await;
            let kind = store.kind();
            store.close().await;
            let status = IndexingStatus {
                in_progress: false,
                last_index_time: None,
                vector_count: count?,
            };
            print_status(&status, kind);
        }
    }

    Ok(())
}

async fn run_index(service: &RagService, item: Option<&str>) -> anyhow::Result<()> {
    match item {
        Some(reference) => {
            let stored = service
                .index_entity(reference)
                .await
                .with_context(|| format!("failed to index '{}'", reference))?;
            println!("Indexed {}: {} chunks", reference, stored);
        }
        None => match service.index_all().await? {
            Some(report) => {
                println!(
                    "Indexed {}/{} items ({} failed), {} chunks stored",
                    report.items_indexed, report.items_total, report.items_failed, report.chunks_stored
                );
            }
            None => println!("An index run is already in progress."),
        },
    }
    Ok(())
}

async fn run_ask(
    service: &RagService,
    cfg: &Config,
    query: &str,
    options: AskOptions,
) -> anyhow::Result<Answer> {
    if service.store().kind() == StoreKind::Memory && service.store().count().await? == 0 {
        if cfg.store.kind == StoreKind::Persistent {
            eprintln!("Persistent store unavailable; indexing into memory for this run.");
        }
        service.index_all().await?;
    }
    Ok(service.answer_question(query, options).await?)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.sources.is_empty() {
        println!("\n(no sources: answered without retrieved context)");
        return;
    }
    println!("\nSources:");
    for (i, chunk) in answer.sources.iter().enumerate() {
        println!(
            "  [{}] {} ({}) {} {}/{}",
            i + 1,
            chunk.source_item_name,
            chunk.source_item_id,
            chunk.metadata.origin,
            chunk.metadata.chunk_index + 1,
            chunk.metadata.total_chunks
        );
    }
}

fn print_status(status: &IndexingStatus, kind: StoreKind) {
    println!("Store:          {}", kind);
    println!("Vectors:        {}", status.vector_count);
    println!("In progress:    {}", status.in_progress);
    match status.last_index_time {
        Some(t) => println!("Last index run: {}", t.to_rfc3339()),
        None => println!("Last index run: never (this process)"),
    }
}
