//! # adlens CLI
//!
//! The `adlens` binary answers natural-language questions about ad-campaign
//! performance from a structured campaigns file.
//!
//! ## Usage
//!
//! ```bash
//! adlens --config ./config/adlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `adlens chunks` | Chunk the campaigns file and print per-kind counts |
//! | `adlens classify "<query>"` | Show the intent, confidence, and entities for a query |
//! | `adlens ask "<query>"` | Build the index and answer a question |
//! | `adlens serve` | Start the HTTP server |
//!
//! Logs go to **stderr** (controlled via `RUST_LOG`) so stdout stays
//! parseable for scripts.

mod config;
mod embedding;
mod ingest;
mod llm;
mod loader;
mod pipeline;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adlens_core::chunker::chunk_portfolio;
use adlens_core::intent::IntentClassifier;

use crate::config::load_config;
use crate::pipeline::Pipeline;

/// adlens — campaign-analytics question answering over hybrid retrieval.
#[derive(Parser)]
#[command(
    name = "adlens",
    about = "Campaign-analytics question answering: query understanding, hybrid retrieval, and context assembly over ad performance data",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/adlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk the campaigns file and print per-kind chunk counts.
    ///
    /// No embeddings are computed; this is a dry run of the indexing
    /// pipeline.
    Chunks,

    /// Classify a query: intent, confidence, and extracted entities.
    Classify {
        /// The query to classify.
        query: String,
    },

    /// Build the index and answer one question.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Start the HTTP server (POST /ask, POST /reindex, GET /health).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adlens=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Chunks => {
            let records = loader::load_campaigns(&config.data.path)?;
            let chunks = chunk_portfolio(&records, &config.chunker());
            let mut counts = std::collections::BTreeMap::new();
            for chunk in &chunks {
                *counts.entry(chunk.kind.as_str()).or_insert(0usize) += 1;
            }
            println!("campaigns: {}", records.len());
            println!("chunks: {}", chunks.len());
            for (kind, count) in counts {
                println!("  {}: {}", kind, count);
            }
        }

        Commands::Classify { query } => {
            let classifier = IntentClassifier::new(config.retrieval.min_confidence);
            let result = classifier.classify(&query);
            println!("intent: {}", result.intent.as_str());
            println!("confidence: {:.2}", result.confidence);
            println!("entities: {}", serde_json::to_string_pretty(&result.entities)?);
        }

        Commands::Ask { query } => {
            let embedder = embedding::create_embedder(&config.embedding)?;
            let generator = llm::create_generator(&config.llm)?;
            let pipeline = Pipeline::new(config, embedder, generator);
            pipeline.reindex().await?;

            let response = pipeline.ask(&query).await;
            println!("{}", response.answer);
            println!();
            println!(
                "intent: {} (confidence {:.2}){}",
                response.intent.as_str(),
                response.confidence,
                if response.degraded { "  [degraded]" } else { "" }
            );
            if !response.sources.is_empty() {
                println!("sources:");
                for source in &response.sources {
                    println!(
                        "  {} | {} | {}",
                        source.chunk_id,
                        source.kind.as_str(),
                        source.campaign_id.as_deref().unwrap_or("portfolio")
                    );
                }
            }
        }

        Commands::Serve => {
            let bind = config.server.bind.clone();
            let embedder = embedding::create_embedder(&config.embedding)?;
            let generator = llm::create_generator(&config.llm)?;
            let pipeline = Arc::new(Pipeline::new(config, embedder, generator));
            pipeline.reindex().await?;
            server::run_server(pipeline, &bind).await?;
        }
    }

    Ok(())
}
