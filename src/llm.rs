//! Language-model provider implementations.
//!
//! Generation is an opaque capability: the pipeline hands over a prompt
//! and receives text. Three providers implement the [`Generator`] trait:
//!
//! - **[`CannedGenerator`]** — deterministic keyword-keyed responses for
//!   offline operation and tests.
//! - **[`OpenAiGenerator`]** — chat-completions API with the same
//!   timeout/backoff policy as the embedding provider.
//! - **[`DisabledGenerator`]** — always errors; exercises the degraded
//!   response path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::config::LlmConfig;

/// Capability contract for answer generation.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, e.g. `"gpt-4o-mini"`.
    fn model_name(&self) -> &str;

    /// Produce answer text for a fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "canned" => Ok(Arc::new(CannedGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Canned Provider ============

/// Deterministic analyst-style responses keyed on prompt keywords.
///
/// Good enough to exercise the full pipeline offline; the canned text
/// leans on the same vocabulary the chunker produces so end-to-end tests
/// can assert on it.
pub struct CannedGenerator;

const CANNED_RESPONSES: &[(&str, &str)] = &[
    (
        "cpm",
        "CPM movement of this size usually points to auction pressure or audience \
         saturation. Check the frequency trend over the same dates; if it is climbing, \
         broaden the audience or refresh creative before raising bids.",
    ),
    (
        "roas",
        "ROAS differences across these campaigns track audience quality more than \
         creative. Shift budget toward the higher-ROAS segment incrementally and \
         re-evaluate after a full conversion window.",
    ),
    (
        "frequency",
        "Frequency at or above the saturation threshold is an audience-fatigue signal. \
         Expect CTR decay next; rotate creative or expand targeting.",
    ),
    (
        "budget",
        "Before moving budget, compare cost per conversion across campaigns over the \
         same window. Reallocate toward the efficient spender in steps of 10-20%.",
    ),
    (
        "compar",
        "Looking at the two campaigns side by side, the gap is driven by delivery cost \
         rather than engagement. The cheaper-CPM campaign wins on ROAS at equal CTR.",
    ),
];

#[async_trait]
impl Generator for CannedGenerator {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let lower = prompt.to_lowercase();
        for (keyword, response) in CANNED_RESPONSES {
            if lower.contains(keyword) {
                return Ok(response.to_string());
            }
        }
        Ok("Based on the campaign data provided, performance is within expected ranges. \
            Ask about a specific metric (CPM, ROAS, CTR, frequency) for a deeper read."
            .to_string())
    }
}

// ============ OpenAI Provider ============

/// Chat-completions provider. Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, "chat request retried");
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

// ============ Disabled Provider ============

/// A generator that always errors.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}
