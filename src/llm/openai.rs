//! OpenAI-compatible chat completions client.
//!
//! OpenAI, Groq, Perplexity and OpenRouter all speak the same
//! `/chat/completions` dialect; they differ only in base URL and a few
//! headers, captured here as a `Preset`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{call_cost, Completion, TextGenerator, UsageMeter, DEFAULT_MAX_TOKENS, REQUEST_TIMEOUT_SECS};

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    OpenAi,
    Groq,
    Perplexity,
    OpenRouter,
}

impl Preset {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "openai" => Some(Preset::OpenAi),
            "groq" => Some(Preset::Groq),
            "perplexity" => Some(Preset::Perplexity),
            "openrouter" => Some(Preset::OpenRouter),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Preset::OpenAi => "openai",
            Preset::Groq => "groq",
            Preset::Perplexity => "perplexity",
            Preset::OpenRouter => "openrouter",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Preset::OpenAi => "https://api.openai.com/v1",
            Preset::Groq => "https://api.groq.com/openai/v1",
            Preset::Perplexity => "https://api.perplexity.ai",
            Preset::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiCompatClient {
    http: Client,
    preset: Preset,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    usage: UsageMeter,
}

impl OpenAiCompatClient {
    pub fn new(
        preset: Preset,
        api_key: SecretString,
        model: &str,
        max_tokens: Option<u32>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("market-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| format!("Failed to build {} HTTP client", preset.kind()))?;

        let base = base_url.unwrap_or(preset.base_url()).trim_end_matches('/');

        Ok(Self {
            http,
            preset,
            endpoint: format!("{base}/chat/completions"),
            api_key,
            model: model.to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            usage: UsageMeter::default(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: prompt.to_string() },
            ],
        };

        debug!(provider = self.preset.kind(), model = %self.model, "Chat completion request");

        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request);
        if self.preset == Preset::OpenRouter {
            builder = builder.header("X-Title", "Market Oracle");
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} request failed", self.preset.kind()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(provider = self.preset.kind(), status = %status, "Chat completion rejected");
            anyhow::bail!("{} API error {status}: {error_text}", self.preset.kind());
        }

        let body: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.preset.kind()))?;

        let usage = body.usage.as_ref();
        let input = usage.map(|u| u.prompt_tokens).unwrap_or(0);
        let output = usage.map(|u| u.completion_tokens).unwrap_or(0);
        let cost = call_cost(&self.model, input, output);
        self.usage.record(cost);

        Ok(Completion {
            text: body.text(),
            tokens: input + output,
            cost,
        })
    }

    fn provider(&self) -> &str {
        self.preset.kind()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
