//! Text-generation providers competing in the pick competition.
//!
//! Defines the `TextGenerator` trait and implementations for
//! OpenAI-compatible chat APIs (OpenAI, Groq, Perplexity, OpenRouter),
//! Anthropic Messages and Google Gemini. Every client makes exactly one
//! attempt per call; failures surface as errors and the caller decides what
//! to do with them.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use anyhow::{bail, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ModelConfig;

/// Shared HTTP timeout for provider calls.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Text returned by a provider plus usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens: u32,
    /// Approximate USD cost of the call.
    pub cost: f64,
}

/// Abstraction over text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one system + user prompt pair and return the raw completion text.
    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion>;

    /// Provider kind, e.g. "anthropic".
    fn provider(&self) -> &str;

    /// Upstream model identifier.
    fn model_name(&self) -> &str;

    /// Cumulative calls and cost for this client.
    fn usage(&self) -> &UsageMeter;
}

/// Returns (input_cost_per_1k, output_cost_per_1k) for known models.
pub(crate) fn model_costs(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("claude") && m.contains("opus") => (0.015, 0.075),
        m if m.contains("claude") && m.contains("haiku") => (0.0008, 0.004),
        m if m.contains("claude") => (0.003, 0.015),
        m if m.contains("gpt-4o-mini") => (0.00015, 0.0006),
        m if m.contains("gpt-4o") => (0.0025, 0.01),
        m if m.contains("gemini") && m.contains("flash") => (0.0001, 0.0004),
        m if m.contains("gemini") => (0.00125, 0.005),
        m if m.contains("llama") || m.contains("mixtral") => (0.0006, 0.0008),
        m if m.contains("sonar") => (0.001, 0.001),
        // Conservative default
        _ => (0.005, 0.015),
    }
}

/// Cost in USD for a call with the given token counts.
pub(crate) fn call_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input, output) = model_costs(model);
    (input_tokens as f64 / 1000.0) * input + (output_tokens as f64 / 1000.0) * output
}

/// Cumulative call and cost counters, safe to bump from concurrent tasks.
#[derive(Debug, Default)]
pub struct UsageMeter {
    total_cost_micro: AtomicU64,
    total_calls: AtomicU64,
}

impl UsageMeter {
    pub fn record(&self, cost: f64) {
        let micro = (cost.max(0.0) * 1_000_000.0) as u64;
        self.total_cost_micro.fetch_add(micro, Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cumulative_cost(&self) -> f64 {
        self.total_cost_micro.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

/// Build the client for a configured model.
///
/// Returns `Ok(None)` when no API key is available so the caller can skip
/// the model; an unknown provider kind is an error.
pub fn build_generator(
    config: &ModelConfig,
    api_key: Option<SecretString>,
) -> Result<Option<Arc<dyn TextGenerator>>> {
    let Some(api_key) = api_key else {
        return Ok(None);
    };

    let client: Arc<dyn TextGenerator> = match config.provider.as_str() {
        "anthropic" => Arc::new(anthropic::AnthropicClient::new(
            api_key,
            &config.model,
            config.max_tokens,
        )?),
        "gemini" | "google" => Arc::new(gemini::GeminiClient::new(
            api_key,
            &config.model,
            config.max_tokens,
        )?),
        kind => {
            let Some(preset) = openai::Preset::from_kind(kind) else {
                bail!("Unknown provider '{kind}' for model {}", config.id);
            };
            Arc::new(openai::OpenAiCompatClient::new(
                preset,
                api_key,
                &config.model,
                config.max_tokens,
                config.base_url.as_deref(),
            )?)
        }
    };
    Ok(Some(client))
}
