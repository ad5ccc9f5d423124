//! Index-build orchestration: load → chunk → embed → build generation.
//!
//! Building happens entirely off to the side; callers only swap the
//! finished generation into the active index, so concurrent readers never
//! observe a partial build and a failed build changes nothing.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use adlens_core::chunker::chunk_portfolio;
use adlens_core::embedding::Embedder;
use adlens_core::index::{IndexEntry, IndexGeneration};
use adlens_core::models::CampaignRecord;

use crate::config::Config;
use crate::loader::load_campaigns;

/// Counters reported after an index build.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub campaigns: usize,
    pub chunks: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub embedding_model: String,
}

/// Everything an index build produces: the generation itself, the
/// campaign-name lookup used to resolve quoted names in queries, and the
/// stats for reporting.
pub struct BuiltIndex {
    pub generation: IndexGeneration,
    pub names: HashMap<String, String>,
    pub stats: IndexStats,
}

/// Build a fresh index generation from the configured campaigns file.
pub async fn build_index(config: &Config, embedder: &dyn Embedder) -> Result<BuiltIndex> {
    let records = load_campaigns(&config.data.path)?;
    build_index_from_records(config, embedder, &records).await
}

/// Build a generation from already-loaded records.
pub async fn build_index_from_records(
    config: &Config,
    embedder: &dyn Embedder,
    records: &[CampaignRecord],
) -> Result<BuiltIndex> {
    let chunks = chunk_portfolio(records, &config.chunker());

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.embedding.batch_size.max(1)) {
        vectors.extend(
            embedder
                .embed(batch)
                .await
                .context("embedding chunk batch")?,
        );
    }

    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { chunk, vector })
        .collect();

    let generation = IndexGeneration::build(entries).context("building index generation")?;

    let names: HashMap<String, String> = records
        .iter()
        .map(|r| (r.name.to_lowercase(), r.id.clone()))
        .collect();

    let stats = IndexStats {
        campaigns: records.len(),
        chunks: generation.len(),
        by_kind: generation
            .kind_counts()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        embedding_model: embedder.model_name().to_string(),
    };

    info!(
        campaigns = stats.campaigns,
        chunks = stats.chunks,
        model = %stats.embedding_model,
        "index generation built"
    );

    Ok(BuiltIndex {
        generation,
        names,
        stats,
    })
}
