//! Hybrid retrieval: metadata filtering × semantic similarity ×
//! intent-aware reranking.
//!
//! # Algorithm
//!
//! 1. Build a hard [`ChunkFilter`] from the extracted entities.
//! 2. Over-fetch `top_k × overfetch_factor` candidates from the index.
//! 3. Rerank: `score = similarity × affinity(intent, kind)`, with a small
//!    multiplicative preference boost (clamped to 1.0) when the chunk's
//!    metadata lists a queried metric or matches the queried audience.
//! 4. Deduplicate by chunk id, keeping the highest score; truncate to `top_k`.
//! 5. If the filter excluded everything, retry once unfiltered and mark
//!    the result degraded — retrieval degrades, it never fails outright.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::{embed_one, Embedder};
use crate::error::RetrievalError;
use crate::index::{ChunkFilter, IndexGeneration};
use crate::intent::{EntitySet, Intent};
use crate::models::{Chunk, ChunkType};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Maximum results to return.
    pub top_k: usize,
    /// Candidate multiplier fetched ahead of reranking.
    pub overfetch_factor: usize,
    /// Multiplicative bonus for soft metric/audience metadata matches.
    pub preference_boost: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            overfetch_factor: 3,
            preference_boost: 1.15,
        }
    }
}

/// A retrieved chunk with its composite relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Ordered, deduplicated retrieval output.
///
/// `degraded` is set when the entity filter matched nothing and the
/// search fell back to the full index; callers surface it to the user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
    pub degraded: bool,
}

impl RetrievalResult {
    /// The degraded empty result used when retrieval itself failed.
    pub fn empty_degraded() -> RetrievalResult {
        RetrievalResult {
            hits: Vec::new(),
            degraded: true,
        }
    }
}

/// Static affinity of each chunk kind for each intent, in `[0, 1]`.
///
/// Multiplied into the similarity score during reranking; `General`
/// leaves the pure similarity ordering untouched.
pub fn affinity(intent: Intent, kind: ChunkType) -> f64 {
    use ChunkType::*;
    match intent {
        Intent::PerformanceAnomaly => match kind {
            Insight => 1.0,
            DailyPerformance => 0.9,
            GlobalInsight => 0.6,
            Overview => 0.5,
            Comparison => 0.4,
        },
        Intent::CampaignComparison => match kind {
            Comparison => 1.0,
            Overview => 0.8,
            DailyPerformance => 0.6,
            GlobalInsight => 0.6,
            Insight => 0.5,
        },
        Intent::TrendAnalysis => match kind {
            DailyPerformance => 1.0,
            Insight => 0.8,
            Overview => 0.6,
            GlobalInsight => 0.6,
            Comparison => 0.5,
        },
        Intent::OptimizationAdvice => match kind {
            Insight => 0.9,
            Overview => 0.8,
            GlobalInsight => 0.8,
            DailyPerformance => 0.7,
            Comparison => 0.7,
        },
        Intent::Forecasting => match kind {
            DailyPerformance => 1.0,
            Insight => 0.8,
            Overview => 0.7,
            GlobalInsight => 0.7,
            Comparison => 0.5,
        },
        Intent::DemographicAnalysis => match kind {
            Comparison => 1.0,
            Overview => 0.9,
            DailyPerformance => 0.6,
            Insight => 0.6,
            GlobalInsight => 0.6,
        },
        Intent::BudgetAnalysis => match kind {
            Overview => 0.9,
            DailyPerformance => 0.9,
            GlobalInsight => 0.8,
            Insight => 0.7,
            Comparison => 0.7,
        },
        Intent::Benchmark => match kind {
            GlobalInsight => 1.0,
            Comparison => 0.9,
            Overview => 0.8,
            DailyPerformance => 0.5,
            Insight => 0.5,
        },
        Intent::General => 1.0,
    }
}

/// Build the hard predicate from the extracted entities.
///
/// Metric names and audience terms are deliberately absent: they are
/// preferences, applied during reranking, not exclusions.
fn filter_from_entities(entities: &EntitySet) -> ChunkFilter {
    ChunkFilter {
        campaign_ids: entities.campaigns.clone(),
        date_range: entities.date_range,
    }
}

/// Retrieve the `top_k` most relevant chunks for a classified query.
///
/// Never returns an empty-because-filtered result: if the predicate
/// excludes every chunk (say, an unknown campaign id), the search runs
/// once more unfiltered and the result is flagged degraded.
pub async fn retrieve(
    index: &IndexGeneration,
    embedder: &dyn Embedder,
    cfg: &RetrieverConfig,
    query: &str,
    intent: Intent,
    entities: &EntitySet,
) -> Result<RetrievalResult, RetrievalError> {
    let query_vec = embed_one(embedder, query)
        .await
        .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

    let fetch = cfg.top_k.saturating_mul(cfg.overfetch_factor).max(cfg.top_k);
    let filter = filter_from_entities(entities);

    let mut degraded = false;
    let mut candidates = if filter.is_empty() {
        index.search(&query_vec, None, fetch)
    } else {
        index.search(&query_vec, Some(&filter), fetch)
    };

    if candidates.is_empty() && !filter.is_empty() {
        warn!(
            campaigns = ?filter.campaign_ids,
            "entity filter matched no chunks; falling back to unfiltered search"
        );
        degraded = true;
        candidates = index.search(&query_vec, None, fetch);
    }

    // Rerank with the intent affinity table and soft preferences.
    let mut best: HashMap<&str, (&Chunk, f64)> = HashMap::new();
    for (chunk, similarity) in candidates {
        let mut score = similarity * affinity(intent, chunk.kind);
        if !entities.metrics.is_empty()
            && chunk.meta.metrics.iter().any(|m| entities.metrics.contains(m))
        {
            score *= cfg.preference_boost;
        }
        if let Some(aud) = &entities.audience {
            let meta_match = chunk
                .meta
                .audience
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(aud));
            if meta_match || chunk.text.to_lowercase().contains(aud.as_str()) {
                score *= cfg.preference_boost;
            }
        }
        let score = score.min(1.0);

        best.entry(chunk.id.as_str())
            .and_modify(|slot| {
                if score > slot.1 {
                    *slot = (chunk, score);
                }
            })
            .or_insert((chunk, score));
    }

    let mut hits: Vec<ScoredChunk> = best
        .into_values()
        .map(|(chunk, score)| ScoredChunk {
            chunk: chunk.clone(),
            score,
        })
        .collect();

    // Score desc, then more-specific kinds first, then recency, then id.
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.kind.specificity().cmp(&a.chunk.kind.specificity()))
            .then_with(|| {
                let da = a.chunk.meta.date_range.map(|r| r.end);
                let db = b.chunk.meta.date_range.map(|r| r.end);
                db.cmp(&da)
            })
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(cfg.top_k);

    debug!(
        intent = intent.as_str(),
        hits = hits.len(),
        degraded,
        "retrieval complete"
    );

    Ok(RetrievalResult { hits, degraded })
}
