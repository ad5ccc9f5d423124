//! Query pipeline orchestration.
//!
//! Sequences classify → retrieve → assemble → generate and packages the
//! model's text with source attribution. Every component failure maps to
//! a degraded answer: retrieval errors and timeouts produce an empty
//! retrieval result plus the no-supporting-data prompt, and a generation
//! failure produces an explanatory canned answer. The caller always
//! receives a response.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use adlens_core::assemble::{assemble, AssemblerConfig, PromptLibrary, SourceRef};
use adlens_core::embedding::Embedder;
use adlens_core::error::RetrievalError;
use adlens_core::index::ActiveIndex;
use adlens_core::intent::{Intent, IntentClassifier};
use adlens_core::retrieve::{retrieve, RetrievalResult, RetrieverConfig};

use crate::config::Config;
use crate::ingest::{build_index, IndexStats};
use crate::llm::Generator;

/// Structured response returned for every query.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub intent: Intent,
    pub confidence: f64,
    /// True when the answer was produced without full supporting context.
    pub degraded: bool,
}

/// The long-lived query pipeline.
///
/// Owns the classifier, the active index generation, and the two external
/// capability providers. Queries are stateless and share only the
/// read-only index snapshot, so they can run concurrently; `reindex`
/// builds a new generation off to the side and swaps it atomically.
pub struct Pipeline {
    config: Config,
    classifier: IntentClassifier,
    index: ActiveIndex,
    names: RwLock<HashMap<String, String>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    retriever_cfg: RetrieverConfig,
    assembler_cfg: AssemblerConfig,
    prompts: PromptLibrary,
}

impl Pipeline {
    /// Construct a pipeline with an empty index. Call [`Pipeline::reindex`]
    /// to populate it.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Pipeline {
        let classifier = IntentClassifier::new(config.retrieval.min_confidence);
        let retriever_cfg = config.retriever();
        let assembler_cfg = config.assembler();
        Pipeline {
            config,
            classifier,
            index: ActiveIndex::empty(),
            names: RwLock::new(HashMap::new()),
            embedder,
            generator,
            retriever_cfg,
            assembler_cfg,
            prompts: PromptLibrary::default(),
        }
    }

    /// Rebuild the index from the configured campaigns file and swap it in.
    ///
    /// On any failure the previous generation keeps serving.
    pub async fn reindex(&self) -> Result<IndexStats> {
        let built = build_index(&self.config, self.embedder.as_ref()).await?;
        *self.names.write().expect("names lock poisoned") = built.names;
        self.index.swap(built.generation);
        Ok(built.stats)
    }

    /// Number of chunks in the active generation.
    pub fn chunk_count(&self) -> usize {
        self.index.load().len()
    }

    /// Answer one query. Never returns an error; failures degrade.
    pub async fn ask(&self, query: &str) -> AnswerResponse {
        let classification = self.classifier.classify(query);
        let mut entities = classification.entities.clone();

        // Resolve quoted campaign names against the loaded catalog.
        if !entities.campaign_names.is_empty() {
            let names = self.names.read().expect("names lock poisoned");
            for name in &entities.campaign_names {
                if let Some(id) = names.get(&name.to_lowercase()) {
                    if !entities.campaigns.contains(id) {
                        entities.campaigns.push(id.clone());
                    }
                }
            }
        }

        let snapshot = self.index.load();
        let retrieval_timeout = Duration::from_secs(self.config.retrieval.timeout_secs);

        let mut degraded = false;
        let retrieval = match tokio::time::timeout(
            retrieval_timeout,
            retrieve(
                &snapshot,
                self.embedder.as_ref(),
                &self.retriever_cfg,
                query,
                classification.intent,
                &entities,
            ),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(error = %err, "retrieval failed; degrading");
                degraded = true;
                RetrievalResult::empty_degraded()
            }
            Err(_) => {
                let err = RetrievalError::Timeout(retrieval_timeout);
                warn!(error = %err, "retrieval timed out; degrading");
                degraded = true;
                RetrievalResult::empty_degraded()
            }
        };
        degraded |= retrieval.degraded;

        let context = assemble(
            &self.prompts,
            &self.assembler_cfg,
            query,
            classification.intent,
            &retrieval,
        );
        debug!(
            intent = classification.intent.as_str(),
            sources = context.sources.len(),
            dropped = context.dropped,
            fallback = context.fallback,
            "context assembled"
        );

        let generate_timeout = Duration::from_secs(self.config.llm.timeout_secs);
        let answer = match tokio::time::timeout(
            generate_timeout,
            self.generator.generate(&context.prompt),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(error = %err, "generation failed; degrading");
                degraded = true;
                unavailable_answer()
            }
            Err(_) => {
                warn!(timeout = ?generate_timeout, "generation timed out; degrading");
                degraded = true;
                unavailable_answer()
            }
        };

        AnswerResponse {
            answer,
            sources: context.sources,
            intent: classification.intent,
            confidence: classification.confidence,
            degraded,
        }
    }
}

fn unavailable_answer() -> String {
    "The analysis model is currently unavailable, so a full answer could not be generated. \
     The retrieved campaign data (if any) is listed in the sources; please retry shortly."
        .to_string()
}
