//! TOML configuration parsing and validation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use adlens_core::assemble::AssemblerConfig;
use adlens_core::chunker::ChunkerConfig;
use adlens_core::retrieve::RetrieverConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Path to the campaigns JSON file.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_coalesce_threshold_days")]
    pub coalesce_threshold_days: usize,
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
    #[serde(default = "default_saturation_frequency")]
    pub saturation_frequency: f64,
    #[serde(default = "default_metric_tolerance")]
    pub metric_tolerance: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            coalesce_threshold_days: default_coalesce_threshold_days(),
            anomaly_threshold: default_anomaly_threshold(),
            saturation_frequency: default_saturation_frequency(),
            metric_tolerance: default_metric_tolerance(),
        }
    }
}

fn default_coalesce_threshold_days() -> usize {
    30
}
fn default_anomaly_threshold() -> f64 {
    0.25
}
fn default_saturation_frequency() -> f64 {
    3.5
}
fn default_metric_tolerance() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_preference_boost")]
    pub preference_boost: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            min_confidence: default_min_confidence(),
            preference_boost: default_preference_boost(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_overfetch_factor() -> usize {
    3
}
fn default_min_confidence() -> f64 {
    0.15
}
fn default_preference_boost() -> f64 {
    1.15
}
fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash` (deterministic, offline), `openai`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `canned` (deterministic, offline), `openai`, or `disabled`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "canned".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7420".to_string()
}

impl Config {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            coalesce_threshold_days: self.chunking.coalesce_threshold_days,
            anomaly_threshold: self.chunking.anomaly_threshold,
            saturation_frequency: self.chunking.saturation_frequency,
            metric_tolerance: self.chunking.metric_tolerance,
        }
    }

    pub fn retriever(&self) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.retrieval.top_k,
            overfetch_factor: self.retrieval.overfetch_factor,
            preference_boost: self.retrieval.preference_boost,
        }
    }

    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig {
            max_context_chars: self.context.max_context_chars,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_confidence) {
        anyhow::bail!("retrieval.min_confidence must be in [0.0, 1.0]");
    }
    if config.retrieval.preference_boost < 1.0 {
        anyhow::bail!("retrieval.preference_boost must be >= 1.0");
    }
    if config.chunking.anomaly_threshold <= 0.0 {
        anyhow::bail!("chunking.anomaly_threshold must be > 0");
    }
    if config.chunking.coalesce_threshold_days == 0 {
        anyhow::bail!("chunking.coalesce_threshold_days must be > 0");
    }
    if config.context.max_context_chars < 200 {
        anyhow::bail!("context.max_context_chars must be >= 200");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or disabled.",
            other
        ),
    }
    if config.embedding.provider == "openai"
        && (config.embedding.model.is_none() || config.embedding.dims.is_none())
    {
        anyhow::bail!("embedding.model and embedding.dims are required for the openai provider");
    }

    match config.llm.provider.as_str() {
        "canned" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be canned, openai, or disabled.",
            other
        ),
    }
    if config.llm.provider == "openai" && config.llm.model.is_none() {
        anyhow::bail!("llm.model is required for the openai provider");
    }

    Ok(config)
}
