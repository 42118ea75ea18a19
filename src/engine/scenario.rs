//! What-if scenario simulation.
//!
//! A user describes a market event; the first available model estimates its
//! impact. The simulation costs credits, charged only once the model's reply
//! has been parsed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::ModelEntry;
use crate::credits::{CreditLedger, SCENARIO_SIMULATION};
use crate::error::{ApiError, ApiResult};
use crate::picks::{coerce_number, json_span, strip_fences};

const MAX_SCENARIO_CHARS: usize = 2000;

const SYSTEM_PROMPT: &str = "You are a macro strategist. Given a hypothetical event, estimate its \
near-term market impact. Respond with a single JSON object and nothing else.";

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRequest {
    pub scenario: String,
    /// Tickers the user cares about most.
    #[serde(default)]
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectedAsset {
    pub ticker: String,
    pub impact_percent: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioAnalysis {
    pub summary: String,
    /// "positive" | "negative" | "neutral"
    pub overall_impact: &'static str,
    pub confidence: f64,
    pub affected_assets: Vec<AffectedAsset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub model_id: String,
    #[serde(flatten)]
    pub analysis: ScenarioAnalysis,
    pub credits_spent: i64,
    pub credits_remaining: i64,
}

pub fn scenario_prompt(request: &ScenarioRequest) -> String {
    let focus = if request.tickers.is_empty() {
        String::new()
    } else {
        format!("\nPay particular attention to: {}.", request.tickers.join(", "))
    };
    format!(
        "Scenario: {}{focus}\n\n\
         Return ONLY a JSON object with this schema:\n\
         {{\n  \"summary\": \"two or three sentences\",\n  \"overall_impact\": \"positive\" | \"negative\" | \"neutral\",\n  \
         \"confidence\": 0-100,\n  \"affected_assets\": [\n    {{\"ticker\": \"SYMBOL\", \"impact_percent\": number, \
         \"rationale\": \"one sentence\"}}\n  ]\n}}",
        request.scenario.trim()
    )
}

fn impact_label(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("positive" | "bullish") => "positive",
        Some("negative" | "bearish") => "negative",
        _ => "neutral",
    }
}

/// Lenient parse of the model's JSON object reply.
pub fn parse_scenario(text: &str) -> Option<ScenarioAnalysis> {
    let cleaned = strip_fences(text);
    let span = json_span(&cleaned, '{', '}')?;
    let obj: serde_json::Map<String, Value> = serde_json::from_str(span).ok()?;

    let summary = obj.get("summary").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    let affected_assets: Vec<AffectedAsset> = obj
        .get("affected_assets")
        .and_then(Value::as_array)
        .map(|assets| {
            assets
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|a| {
                    let ticker: String = a
                        .get("ticker")
                        .and_then(Value::as_str)?
                        .to_uppercase()
                        .chars()
                        .filter(|c| c.is_ascii_alphanumeric())
                        .collect();
                    (!ticker.is_empty()).then(|| AffectedAsset {
                        ticker,
                        impact_percent: coerce_number(a.get("impact_percent")),
                        rationale: a.get("rationale").and_then(Value::as_str).unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if summary.is_empty() && affected_assets.is_empty() {
        return None;
    }

    Some(ScenarioAnalysis {
        summary,
        overall_impact: impact_label(obj.get("overall_impact").and_then(Value::as_str)),
        confidence: coerce_number(obj.get("confidence")).clamp(0.0, 100.0),
        affected_assets,
    })
}

/// Run a scenario for `user_id`, charging `cost` credits on success.
pub async fn run_scenario(
    ledger: &CreditLedger,
    models: &[ModelEntry],
    user_id: &str,
    request: &ScenarioRequest,
    cost: i64,
) -> ApiResult<ScenarioOutcome> {
    let scenario = request.scenario.trim();
    if scenario.is_empty() {
        return Err(ApiError::BadRequest("scenario is required".into()));
    }
    if scenario.chars().count() > MAX_SCENARIO_CHARS {
        return Err(ApiError::BadRequest(format!("scenario exceeds {MAX_SCENARIO_CHARS} characters")));
    }

    let balance = ledger.balance(user_id).await?;
    if balance < cost {
        return Err(ApiError::PaymentRequired(format!(
            "Insufficient credits: {cost} required, {balance} available"
        )));
    }

    let model = models
        .first()
        .ok_or_else(|| anyhow::anyhow!("No text-generation model is configured"))?;

    let completion = model
        .client
        .generate(SYSTEM_PROMPT, &scenario_prompt(request))
        .await
        .map_err(|e| {
            warn!(model = %model.id, error = %e, "Scenario generation failed");
            anyhow::anyhow!("Scenario simulation failed")
        })?;

    let analysis = parse_scenario(&completion.text)
        .ok_or_else(|| anyhow::anyhow!("Scenario simulation returned an unreadable response"))?;

    let remaining = ledger
        .spend(user_id, cost, SCENARIO_SIMULATION, &format!("Scenario: {}", truncate(scenario, 80)))
        .await?;

    info!(user_id, model = %model.id, impact = analysis.overall_impact, "Scenario simulated");

    Ok(ScenarioOutcome {
        scenario: scenario.to_string(),
        model_id: model.id.clone(),
        analysis,
        credits_spent: cost,
        credits_remaining: remaining,
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
