//! Macro indicators from FRED (Federal Reserve Economic Data).
//!
//! API: `https://api.stlouisfed.org/fred/series/observations`
//! Auth: API key via `api_key` query param. Free registration.
//! Rate limit: 120 req/min.
//!
//! A fixed indicator list is fetched concurrently; each series reports its
//! latest and previous observation, the change between them and a trend.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::USER_AGENT;

const FRED_API_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

// ---------------------------------------------------------------------------
// Indicator list
// ---------------------------------------------------------------------------

pub struct Indicator {
    pub series_id: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
}

pub const INDICATORS: &[Indicator] = &[
    Indicator { series_id: "FEDFUNDS", name: "Federal Funds Rate", unit: "%" },
    Indicator { series_id: "CPIAUCSL", name: "Consumer Price Index", unit: "index" },
    Indicator { series_id: "UNRATE", name: "Unemployment Rate", unit: "%" },
    Indicator { series_id: "GDP", name: "Gross Domestic Product", unit: "billions USD" },
    Indicator { series_id: "DGS10", name: "10-Year Treasury Yield", unit: "%" },
    Indicator { series_id: "DGS2", name: "2-Year Treasury Yield", unit: "%" },
    Indicator { series_id: "T10Y2Y", name: "10Y-2Y Treasury Spread", unit: "%" },
    Indicator { series_id: "VIXCLS", name: "CBOE Volatility Index", unit: "index" },
    Indicator { series_id: "MORTGAGE30US", name: "30-Year Mortgage Rate", unit: "%" },
    Indicator { series_id: "UMCSENT", name: "Consumer Sentiment", unit: "index" },
];

// ---------------------------------------------------------------------------
// FRED API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FredResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FredObservation {
    pub date: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReading {
    pub series_id: String,
    pub name: String,
    pub unit: String,
    pub latest: f64,
    pub latest_date: String,
    pub previous: Option<f64>,
    pub change: Option<f64>,
    /// "up" | "down" | "flat"
    pub trend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EconomicSnapshot {
    pub indicators: Vec<IndicatorReading>,
    /// 10Y below 2Y. `None` when either yield is unavailable.
    pub yield_curve_inverted: Option<bool>,
    pub fetched_at: DateTime<Utc>,
}

impl EconomicSnapshot {
    pub fn from_readings(indicators: Vec<IndicatorReading>, fetched_at: DateTime<Utc>) -> Self {
        let latest = |id: &str| indicators.iter().find(|r| r.series_id == id).map(|r| r.latest);
        let yield_curve_inverted = latest("DGS10").zip(latest("DGS2")).map(|(ten, two)| ten < two);
        Self {
            indicators,
            yield_curve_inverted,
            fetched_at,
        }
    }

    pub fn get(&self, series_id: &str) -> Option<&IndicatorReading> {
        self.indicators.iter().find(|r| r.series_id == series_id)
    }
}

pub fn trend_label(change: Option<f64>) -> &'static str {
    match change {
        Some(c) if c > 0.0 => "up",
        Some(c) if c < 0.0 => "down",
        _ => "flat",
    }
}

/// Summarize newest-first observations. FRED marks missing values as ".".
pub fn summarize(indicator: &Indicator, observations: &[FredObservation]) -> Option<IndicatorReading> {
    let mut values = observations
        .iter()
        .filter_map(|o| o.value.parse::<f64>().ok().map(|v| (o.date.as_str(), v)));

    let (latest_date, latest) = values.next()?;
    let previous = values.next().map(|(_, v)| v);
    let change = previous.map(|p| latest - p);

    Some(IndicatorReading {
        series_id: indicator.series_id.to_string(),
        name: indicator.name.to_string(),
        unit: indicator.unit.to_string(),
        latest,
        latest_date: latest_date.to_string(),
        previous,
        change,
        trend: trend_label(change),
    })
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct EconomicsProvider {
    http: Client,
    fred_api_key: Option<SecretString>,
}

impl EconomicsProvider {
    pub fn new(fred_api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build economics HTTP client")?;
        Ok(Self { http, fred_api_key })
    }

    /// Fetch recent observations for a FRED series, newest first.
    async fn fetch_fred_series(&self, series_id: &str, api_key: &SecretString) -> Result<Vec<FredObservation>> {
        let url = format!(
            "{FRED_API_URL}?series_id={series_id}&api_key={}&file_type=json&sort_order=desc&limit=10",
            api_key.expose_secret()
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("FRED request failed for {series_id}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("FRED API error for {series_id}: {status}");
        }

        let data: FredResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse FRED response for {series_id}"))?;

        Ok(data.observations)
    }

    /// Fetch every indicator concurrently. Series that fail are left out.
    pub async fn snapshot(&self) -> Result<EconomicSnapshot> {
        let key = self
            .fred_api_key
            .as_ref()
            .context("FRED API key not configured")?;

        let results = join_all(
            INDICATORS
                .iter()
                .map(|ind| async move { (ind, self.fetch_fred_series(ind.series_id, key).await) }),
        )
        .await;

        let mut readings = Vec::with_capacity(INDICATORS.len());
        for (indicator, result) in results {
            match result {
                Ok(obs) => match summarize(indicator, &obs) {
                    Some(reading) => readings.push(reading),
                    None => debug!(series = indicator.series_id, "FRED series has no numeric data"),
                },
                Err(e) => warn!(series = indicator.series_id, error = %e, "FRED fetch failed"),
            }
        }

        Ok(EconomicSnapshot::from_readings(readings, Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
