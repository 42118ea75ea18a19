//! Anthropic Claude integration via the Messages API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{call_cost, Completion, TextGenerator, UsageMeter, DEFAULT_MAX_TOKENS, REQUEST_TIMEOUT_SECS};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    /// Concatenate all text blocks, ignoring tool-use and other block kinds.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.content_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    usage: UsageMeter,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, model: &str, max_tokens: Option<u32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("market-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            usage: UsageMeter::default(),
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message { role: "user", content: prompt }],
        };

        debug!(model = %self.model, "Anthropic messages request");

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, "Anthropic API error");
            anyhow::bail!("Anthropic API error {status}: {error_text}");
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        let (input, output) = body
            .usage
            .as_ref()
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));
        let cost = call_cost(&self.model, input, output);
        self.usage.record(cost);

        Ok(Completion {
            text: body.text(),
            tokens: input + output,
            cost,
        })
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let client =
            AnthropicClient::new(SecretString::new("k".into()), "claude-sonnet-4-20250514", None).unwrap();
        assert_eq!(client.model_name(), "claude-sonnet-4-20250514");
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.usage().cumulative_cost(), 0.0);
    }

    #[test]
    fn test_text_blocks_joined() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[
                {"type":"text","text":"```json\n["},
                {"type":"tool_use","id":"x"},
                {"type":"text","text":"]\n```"}
            ],"usage":{"input_tokens":12,"output_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(body.text(), "```json\n[]\n```");
        assert_eq!(body.usage.unwrap().output_tokens, 3);
    }

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "claude",
            max_tokens: 100,
            system: "sys",
            messages: vec![Message { role: "user", content: "hi" }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
