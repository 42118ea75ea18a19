//! Pick prompting and lenient parsing of provider output.
//!
//! Providers are asked for a JSON array but routinely wrap it in prose or
//! markdown fences, return numbers as strings, or invent extra fields. The
//! parser takes the outermost `[...]` span and coerces every field it can;
//! anything it cannot coerce falls back to a neutral value.

pub mod prompts;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

pub use prompts::{pick_prompt, SYSTEM_PROMPT};

/// Maximum stored length of a pick's reasoning, in characters.
pub const MAX_REASONING_CHARS: usize = 1000;

/// One coerced element of a provider's pick array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedPick {
    pub ticker: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub reasoning: String,
}

/// Parse picks, returning an empty list on any failure.
pub fn parse_picks(text: &str, max: usize) -> Vec<ParsedPick> {
    try_parse_picks(text, max).unwrap_or_default()
}

/// Parse picks, reporting why the text could not be read.
pub fn try_parse_picks(text: &str, max: usize) -> Result<Vec<ParsedPick>> {
    let cleaned = strip_fences(text);
    let span = json_span(&cleaned, '[', ']').context("No JSON array in response")?;
    let items: Vec<Value> = serde_json::from_str(span).context("Malformed JSON array in response")?;

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| ParsedPick {
            ticker: clean_ticker(obj.get("ticker").or_else(|| obj.get("symbol"))),
            confidence: coerce_number(obj.get("confidence")).clamp(0.0, 100.0),
            entry_price: coerce_number(obj.get("entry_price").or_else(|| obj.get("entryPrice"))),
            target_price: coerce_number(obj.get("target_price").or_else(|| obj.get("targetPrice"))),
            reasoning: obj
                .get("reasoning")
                .and_then(Value::as_str)
                .map(|s| s.chars().take(MAX_REASONING_CHARS).collect())
                .unwrap_or_default(),
        })
        .filter(|p| !p.ticker.is_empty())
        .take(max)
        .collect())
}

/// Remove markdown code fences, keeping their contents.
pub fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slice from the first `open` to the last `close`, inclusive.
pub fn json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Numeric coercion: numbers pass through, numeric strings (with `$`, `%`
/// or thousands separators) are parsed, everything else is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('$')
            .trim_end_matches('%')
            .replace(',', "")
            .parse::<f64>()
            .unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn clean_ticker(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
