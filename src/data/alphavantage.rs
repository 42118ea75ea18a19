//! Alpha Vantage technical indicators.
//!
//! API: `https://www.alphavantage.co/query`
//! Auth: `apikey` query param. Free tier: 25 req/day, so callers should
//! expect rate-limit notes in place of data.
//!
//! Each indicator call returns a date-keyed series; only the latest point
//! is kept.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::USER_AGENT;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Latest technical readings for a ticker. Missing pieces are `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Technicals {
    pub rsi: Option<f64>,
    pub rsi_signal: Option<&'static str>,
    pub macd: Option<f64>,
    pub macd_signal_line: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub macd_trend: Option<&'static str>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ma_cross: Option<&'static str>,
}

impl Technicals {
    pub fn is_empty(&self) -> bool {
        self.rsi.is_none() && self.macd_histogram.is_none() && self.sma50.is_none() && self.sma200.is_none()
    }
}

pub fn rsi_label(rsi: f64) -> &'static str {
    if rsi > RSI_OVERBOUGHT {
        "overbought"
    } else if rsi < RSI_OVERSOLD {
        "oversold"
    } else {
        "neutral"
    }
}

pub fn macd_label(histogram: f64) -> &'static str {
    if histogram > 0.0 {
        "bullish"
    } else if histogram < 0.0 {
        "bearish"
    } else {
        "neutral"
    }
}

pub fn ma_cross_label(sma50: f64, sma200: f64) -> &'static str {
    if sma50 > sma200 {
        "golden_cross"
    } else if sma50 < sma200 {
        "death_cross"
    } else {
        "neutral"
    }
}

/// Latest data point of an indicator series.
///
/// Finds the `Technical Analysis: *` object, takes the greatest date key and
/// reads the named fields from it as numbers.
pub fn latest_point(body: &Value, fields: &[&str]) -> Result<Vec<f64>> {
    if let Some(note) = body.get("Note").or_else(|| body.get("Information")).and_then(Value::as_str) {
        anyhow::bail!("Alpha Vantage limit: {note}");
    }
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        anyhow::bail!("Alpha Vantage error: {message}");
    }

    let series = body
        .as_object()
        .and_then(|obj| {
            obj.iter()
                .find(|(k, _)| k.starts_with("Technical Analysis"))
                .and_then(|(_, v)| v.as_object())
        })
        .context("No technical analysis series in response")?;

    let (date, point) = series
        .iter()
        .max_by(|a, b| a.0.cmp(b.0))
        .context("Empty technical analysis series")?;

    fields
        .iter()
        .map(|field| {
            point
                .get(*field)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .with_context(|| format!("Missing {field} at {date}"))
        })
        .collect()
}

pub struct AlphaVantageClient {
    http: Client,
    api_key: Option<SecretString>,
}

impl AlphaVantageClient {
    pub fn new(api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Alpha Vantage HTTP client")?;
        Ok(Self { http, api_key })
    }

    async fn indicator(&self, function: &str, ticker: &str, period: Option<u32>) -> Result<Value> {
        let key = self
            .api_key
            .as_ref()
            .context("Alpha Vantage API key not configured")?;

        let mut url = format!(
            "{ALPHA_VANTAGE_URL}?function={function}&symbol={}&interval=daily&series_type=close",
            urlencoding::encode(ticker)
        );
        if let Some(period) = period {
            url.push_str(&format!("&time_period={period}"));
        }
        debug!(function, ticker, "Alpha Vantage request");
        url.push_str(&format!("&apikey={}", key.expose_secret()));

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Alpha Vantage {function} request failed"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Alpha Vantage {function} error: {status}");
        }
        resp.json().await.with_context(|| format!("Failed to parse Alpha Vantage {function}"))
    }

    async fn rsi(&self, ticker: &str) -> Result<f64> {
        let body = self.indicator("RSI", ticker, Some(14)).await?;
        Ok(latest_point(&body, &["RSI"])?[0])
    }

    /// (macd, signal, histogram)
    async fn macd(&self, ticker: &str) -> Result<(f64, f64, f64)> {
        let body = self.indicator("MACD", ticker, None).await?;
        let values = latest_point(&body, &["MACD", "MACD_Signal", "MACD_Hist"])?;
        Ok((values[0], values[1], values[2]))
    }

    async fn sma(&self, ticker: &str, period: u32) -> Result<f64> {
        let body = self.indicator("SMA", ticker, Some(period)).await?;
        Ok(latest_point(&body, &["SMA"])?[0])
    }

    /// Fetch all indicators concurrently; each failure leaves its fields empty.
    pub async fn technicals(&self, ticker: &str) -> Result<Technicals> {
        if self.api_key.is_none() {
            anyhow::bail!("Alpha Vantage API key not configured");
        }

        let (rsi, macd, sma50, sma200) = tokio::join!(
            self.rsi(ticker),
            self.macd(ticker),
            self.sma(ticker, 50),
            self.sma(ticker, 200),
        );

        let rsi = log_missing("RSI", ticker, rsi);
        let macd = log_missing("MACD", ticker, macd);
        let sma50 = log_missing("SMA50", ticker, sma50);
        let sma200 = log_missing("SMA200", ticker, sma200);

        Ok(Technicals {
            rsi,
            rsi_signal: rsi.map(rsi_label),
            macd: macd.map(|m| m.0),
            macd_signal_line: macd.map(|m| m.1),
            macd_histogram: macd.map(|m| m.2),
            macd_trend: macd.map(|m| macd_label(m.2)),
            sma50,
            sma200,
            ma_cross: sma50.zip(sma200).map(|(a, b)| ma_cross_label(a, b)),
        })
    }
}

fn log_missing<T>(indicator: &str, ticker: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(indicator, ticker, error = %e, "Technical indicator unavailable");
            None
        }
    }
}
