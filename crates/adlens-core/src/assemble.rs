//! Context assembly: turn a retrieval result into a bounded,
//! intent-specific prompt.
//!
//! Chunks are appended in descending score order until the next addition
//! would exceed the character budget; lower-ranked chunks are dropped
//! whole rather than truncated mid-sentence, and the query itself is
//! never truncated. Each included chunk is prefixed with its campaign id,
//! kind, and date so the model can attribute claims, and the same
//! references are returned for the caller's source list.

use serde::Serialize;

use crate::intent::Intent;
use crate::models::ChunkType;
use crate::retrieve::RetrievalResult;

/// Assembly limits, decoupled from application config.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Maximum prompt size in characters.
    pub max_context_chars: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
        }
    }
}

/// Attribution reference for one included chunk.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub campaign_id: Option<String>,
    pub kind: ChunkType,
}

/// The rendered prompt plus everything the caller needs for attribution.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub prompt: String,
    pub sources: Vec<SourceRef>,
    /// Chunks dropped to honor the size budget.
    pub dropped: usize,
    /// True when the no-supporting-data template was used.
    pub fallback: bool,
}

/// Intent-keyed prompt templates.
///
/// Every intent carries an instruction block appended to a shared analyst
/// frame; `General` doubles as the default. The fallback template asks
/// the model to answer from general advertising knowledge and to say so.
pub struct PromptLibrary {
    frame: &'static str,
    fallback: &'static str,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            frame: "You are a senior advertising performance analyst. Answer the question \
                    using only the campaign data provided below. Reference campaign ids and \
                    exact figures from the data, and structure the answer clearly.",
            fallback: "You are a senior advertising performance analyst. No supporting campaign \
                       data was found for this question. Answer from general advertising \
                       knowledge, and state clearly that no campaign-specific data was available.",
        }
    }
}

impl PromptLibrary {
    fn instructions(&self, intent: Intent) -> &'static str {
        match intent {
            Intent::PerformanceAnomaly => {
                "Focus on root causes and the timeline of changes. Quote the specific \
                 metrics and percentage moves that triggered the anomaly."
            }
            Intent::CampaignComparison => {
                "Provide a side-by-side comparison with specific metrics. Name the \
                 stronger campaign and explain what drives the gap."
            }
            Intent::TrendAnalysis => {
                "Describe the direction and pace of change over the period covered by \
                 the data, citing dates."
            }
            Intent::OptimizationAdvice => {
                "Give specific, actionable recommendations with the expected impact, \
                 ordered by likely return."
            }
            Intent::Forecasting => {
                "Base any projection on the historical pattern in the data and state \
                 your assumptions and confidence."
            }
            Intent::DemographicAnalysis => {
                "Break the answer down by audience, citing which audiences convert or \
                 engage best."
            }
            Intent::BudgetAnalysis => {
                "Evaluate spend efficiency and budget allocation, citing cost metrics \
                 from the data."
            }
            Intent::Benchmark => {
                "Compare the cited figures against the portfolio-level aggregates in \
                 the data rather than external numbers."
            }
            Intent::General => "Be specific and data-driven.",
        }
    }

    /// Render the full prompt for `intent` from pre-formatted context
    /// blocks. `blocks` are included verbatim, in order.
    fn render(&self, intent: Intent, query: &str, blocks: &[String]) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.frame);
        prompt.push_str("\n\n");
        prompt.push_str(self.instructions(intent));
        prompt.push_str("\n\nCampaign data:\n");
        for block in blocks {
            prompt.push_str(block);
            prompt.push('\n');
        }
        prompt.push_str("\nQuestion: ");
        prompt.push_str(query);
        prompt
    }

    fn render_fallback(&self, query: &str) -> String {
        format!("{}\n\nQuestion: {}", self.fallback, query)
    }
}

/// Attribution prefix rendered before each chunk text.
fn block_for(hit: &crate::retrieve::ScoredChunk) -> String {
    let campaign = hit
        .chunk
        .meta
        .campaign_ids
        .first()
        .map(String::as_str)
        .unwrap_or("portfolio");
    let date = hit
        .chunk
        .meta
        .date_range
        .map(|r| r.to_string())
        .unwrap_or_else(|| "all dates".to_string());
    format!(
        "[{} | {} | {}] {}",
        campaign,
        hit.chunk.kind.as_str(),
        date,
        hit.chunk.text
    )
}

/// Select the template for `intent` and render it with the query and as
/// many retrieved chunks as fit the budget.
pub fn assemble(
    library: &PromptLibrary,
    cfg: &AssemblerConfig,
    query: &str,
    intent: Intent,
    result: &RetrievalResult,
) -> PromptContext {
    if result.hits.is_empty() {
        return PromptContext {
            prompt: library.render_fallback(query),
            sources: Vec::new(),
            dropped: 0,
            fallback: true,
        };
    }

    let base_len = library.render(intent, query, &[]).len();
    let mut blocks: Vec<String> = Vec::new();
    let mut sources: Vec<SourceRef> = Vec::new();
    let mut used = base_len;
    let mut dropped = 0usize;

    for hit in &result.hits {
        let block = block_for(hit);
        let cost = block.len() + 1; // trailing newline
        if used + cost > cfg.max_context_chars {
            // Stop at the first overflow; everything below this score is dropped.
            dropped = result.hits.len() - blocks.len();
            break;
        }
        used += cost;
        sources.push(SourceRef {
            chunk_id: hit.chunk.id.clone(),
            campaign_id: hit.chunk.meta.campaign_ids.first().cloned(),
            kind: hit.chunk.kind,
        });
        blocks.push(block);
    }

    if blocks.is_empty() {
        // Budget too small for any chunk: same contract as empty retrieval.
        return PromptContext {
            prompt: library.render_fallback(query),
            sources: Vec::new(),
            dropped: result.hits.len(),
            fallback: true,
        };
    }

    PromptContext {
        prompt: library.render(intent, query, &blocks),
        sources,
        dropped,
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMeta, ChunkType};
    use crate::retrieve::ScoredChunk;

    fn hit(id: &str, campaign: &str, score: f64, text: &str) -> ScoredChunk {
        ScoredChunk {
            score,
            chunk: Chunk {
                id: id.to_string(),
                kind: ChunkType::DailyPerformance,
                text: text.to_string(),
                meta: ChunkMeta {
                    campaign_ids: vec![campaign.to_string()],
                    ..ChunkMeta::default()
                },
            },
        }
    }

    fn result(hits: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult {
            hits,
            degraded: false,
        }
    }

    #[test]
    fn test_prompt_never_exceeds_budget() {
        let library = PromptLibrary::default();
        let cfg = AssemblerConfig {
            max_context_chars: 900,
        };
        let hits = (0..10)
            .map(|i| hit(&format!("c{}", i), "camp_001", 1.0 - i as f64 * 0.05, &"metrics text ".repeat(8)))
            .collect();
        let ctx = assemble(&library, &cfg, "How did camp_001 perform?", Intent::General, &result(hits));
        assert!(ctx.prompt.len() <= 900, "prompt length {}", ctx.prompt.len());
        assert!(ctx.dropped > 0);
        assert!(!ctx.fallback);
    }

    #[test]
    fn test_query_is_never_truncated() {
        let library = PromptLibrary::default();
        let cfg = AssemblerConfig {
            max_context_chars: 700,
        };
        let query = "Why did CPM spike 40% last week in campaign camp_001, and what should \
                     I change about frequency caps, budget, and audience targeting?";
        let ctx = assemble(
            &library,
            &cfg,
            query,
            Intent::PerformanceAnomaly,
            &result(vec![hit("c1", "camp_001", 0.9, "CPM rose from $7.10 to $10.10.")]),
        );
        assert!(ctx.prompt.contains(query));
    }

    #[test]
    fn test_drops_lowest_scored_first() {
        let library = PromptLibrary::default();
        // Room for roughly one chunk after the frame.
        let cfg = AssemblerConfig {
            max_context_chars: 500,
        };
        let hits = vec![
            hit("best", "camp_001", 0.9, &"a".repeat(120)),
            hit("worst", "camp_001", 0.2, &"b".repeat(120)),
        ];
        let ctx = assemble(&library, &cfg, "q", Intent::General, &result(hits));
        assert_eq!(ctx.sources.len(), 1);
        assert_eq!(ctx.sources[0].chunk_id, "best");
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_empty_retrieval_uses_fallback_template() {
        let library = PromptLibrary::default();
        let cfg = AssemblerConfig::default();
        let ctx = assemble(
            &library,
            &cfg,
            "What is a good CTR?",
            Intent::Benchmark,
            &RetrievalResult::empty_degraded(),
        );
        assert!(ctx.fallback);
        assert!(ctx.sources.is_empty());
        assert!(ctx.prompt.contains("No supporting campaign data"));
        assert!(ctx.prompt.contains("What is a good CTR?"));
    }

    #[test]
    fn test_sources_preserve_attribution() {
        let library = PromptLibrary::default();
        let cfg = AssemblerConfig::default();
        let ctx = assemble(
            &library,
            &cfg,
            "How is camp_001 doing?",
            Intent::General,
            &result(vec![hit("c1", "camp_001", 0.9, "daily data")]),
        );
        assert_eq!(ctx.sources.len(), 1);
        assert_eq!(ctx.sources[0].chunk_id, "c1");
        assert_eq!(ctx.sources[0].campaign_id.as_deref(), Some("camp_001"));
        assert_eq!(ctx.sources[0].kind, ChunkType::DailyPerformance);
        assert!(ctx.prompt.contains("[camp_001 | daily_performance | all dates]"));
    }

    #[test]
    fn test_intent_selects_instruction_block() {
        let library = PromptLibrary::default();
        let cfg = AssemblerConfig::default();
        let anomaly = assemble(
            &library,
            &cfg,
            "q",
            Intent::PerformanceAnomaly,
            &result(vec![hit("c1", "camp_001", 0.9, "x")]),
        );
        let comparison = assemble(
            &library,
            &cfg,
            "q",
            Intent::CampaignComparison,
            &result(vec![hit("c1", "camp_001", 0.9, "x")]),
        );
        assert!(anomaly.prompt.contains("root causes"));
        assert!(comparison.prompt.contains("side-by-side"));
    }
}
