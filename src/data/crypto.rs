//! Global crypto market statistics from CoinGecko.
//!
//! API: `https://api.coingecko.com/api/v3/global` (no key required).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::USER_AGENT;

const COINGECKO_GLOBAL_URL: &str = "https://api.coingecko.com/api/v3/global";

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    active_cryptocurrencies: i64,
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
    #[serde(default)]
    market_cap_change_percentage_24h_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CryptoMarketStats {
    pub total_market_cap_usd: f64,
    pub total_volume_usd: f64,
    pub btc_dominance: f64,
    pub eth_dominance: f64,
    pub market_cap_change_24h: f64,
    pub active_cryptocurrencies: i64,
    pub fetched_at: DateTime<Utc>,
}

impl From<GlobalData> for CryptoMarketStats {
    fn from(data: GlobalData) -> Self {
        Self {
            total_market_cap_usd: data.total_market_cap.get("usd").copied().unwrap_or(0.0),
            total_volume_usd: data.total_volume.get("usd").copied().unwrap_or(0.0),
            btc_dominance: data.market_cap_percentage.get("btc").copied().unwrap_or(0.0),
            eth_dominance: data.market_cap_percentage.get("eth").copied().unwrap_or(0.0),
            market_cap_change_24h: data.market_cap_change_percentage_24h_usd,
            active_cryptocurrencies: data.active_cryptocurrencies,
            fetched_at: Utc::now(),
        }
    }
}

pub struct CoinGeckoClient {
    http: Client,
}

impl CoinGeckoClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self { http })
    }

    pub async fn global_stats(&self) -> Result<CryptoMarketStats> {
        debug!("CoinGecko global stats request");
        let resp = self
            .http
            .get(COINGECKO_GLOBAL_URL)
            .send()
            .await
            .context("CoinGecko request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGecko API error: {status}");
        }

        let body: GlobalResponse = resp.json().await.context("Failed to parse CoinGecko response")?;
        Ok(body.data.into())
    }
}
