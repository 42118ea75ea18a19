//! Deterministic providers for integration testing.
//!
//! `ScriptedModel` answers pick prompts and scenario prompts with fixed
//! text; `MockQuotes` serves prices set from test code. Both are
//! in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use market_oracle::data::QuoteProvider;
use market_oracle::engine::ModelEntry;
use market_oracle::llm::{Completion, TextGenerator, UsageMeter};
use market_oracle::types::{PickCategory, Quote};

/// A text generator that replays canned replies.
pub struct ScriptedModel {
    picks_reply: String,
    scenario_reply: String,
    calls: AtomicUsize,
    usage: UsageMeter,
}

impl ScriptedModel {
    pub fn new(picks_reply: &str) -> Self {
        Self {
            picks_reply: picks_reply.to_string(),
            scenario_reply: SCENARIO_REPLY.to_string(),
            calls: AtomicUsize::new(0),
            usage: UsageMeter::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub const SCENARIO_REPLY: &str = r#"Here is my analysis:
{"summary": "A surprise rate cut lifts long-duration assets.",
 "overall_impact": "positive",
 "confidence": 68,
 "affected_assets": [
   {"ticker": "QQQ", "impact_percent": 3.5, "rationale": "Growth re-rates"},
   {"ticker": "TLT", "impact_percent": 4.0, "rationale": "Yields fall"}
 ]}"#;

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = if prompt.starts_with("Scenario:") {
            &self.scenario_reply
        } else {
            &self.picks_reply
        };
        if text.is_empty() {
            return Err(anyhow!("HTTP 503: model overloaded"));
        }
        self.usage.record(0.001);
        Ok(Completion { text: text.clone(), tokens: 100, cost: 0.001 })
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }

    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

pub fn model_entry(id: &str, model: Arc<ScriptedModel>) -> ModelEntry {
    ModelEntry {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        provider: "scripted".to_string(),
        client: model,
    }
}

/// Quote provider backed by a settable price map.
#[derive(Default)]
pub struct MockQuotes {
    prices: Mutex<HashMap<String, f64>>,
    /// If set, every lookup fails with this message.
    force_error: Mutex<Option<String>>,
}

impl MockQuotes {
    pub fn with_prices(prices: &[(&str, f64)]) -> Arc<Self> {
        let quotes = Self::default();
        for (ticker, price) in prices {
            quotes.set(ticker, *price);
        }
        Arc::new(quotes)
    }

    pub fn set(&self, ticker: &str, price: f64) {
        self.prices.lock().unwrap().insert(ticker.to_uppercase(), price);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl QuoteProvider for MockQuotes {
    async fn quote(&self, ticker: &str, _category: PickCategory) -> Result<Option<Quote>> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let price = self.prices.lock().unwrap().get(&ticker.to_uppercase()).copied();
        Ok(price.map(|p| Quote::from_price(ticker, p)))
    }
}
