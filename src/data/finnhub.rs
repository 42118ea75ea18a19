//! Finnhub market data client.
//!
//! API: `https://finnhub.io/api/v1`
//! Auth: `token` query param. Free tier: 60 req/min.
//!
//! Covers quotes, company profiles, news sentiment, analyst recommendation
//! trends, insider transactions and company news. Crypto tickers are quoted
//! through Binance USDT pairs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{QuoteProvider, USER_AGENT};
use crate::types::{PickCategory, Quote};

const FINNHUB_API_URL: &str = "https://finnhub.io/api/v1";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    #[serde(default)]
    c: f64,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
    #[serde(default)]
    h: f64,
    #[serde(default)]
    l: f64,
    #[serde(default)]
    o: f64,
    #[serde(default)]
    pc: f64,
    #[serde(default)]
    t: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub finnhub_industry: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
    /// Millions of `currency`.
    #[serde(default)]
    pub market_capitalization: f64,
    #[serde(default)]
    pub share_outstanding: f64,
    #[serde(default)]
    pub ipo: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub weburl: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsBuzz {
    #[serde(default)]
    pub articles_in_last_week: i64,
    #[serde(default)]
    pub buzz: f64,
    #[serde(default)]
    pub weekly_average: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentSplit {
    #[serde(default)]
    pub bearish_percent: f64,
    #[serde(default)]
    pub bullish_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsSentiment {
    #[serde(default)]
    pub buzz: NewsBuzz,
    #[serde(default)]
    pub company_news_score: f64,
    #[serde(default)]
    pub sector_average_bullish_percent: f64,
    #[serde(default)]
    pub sector_average_news_score: f64,
    #[serde(default)]
    pub sentiment: SentimentSplit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationTrend {
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub strong_buy: i64,
    #[serde(default)]
    pub buy: i64,
    #[serde(default)]
    pub hold: i64,
    #[serde(default)]
    pub sell: i64,
    #[serde(default)]
    pub strong_sell: i64,
}

impl RecommendationTrend {
    pub fn total(&self) -> i64 {
        self.strong_buy + self.buy + self.hold + self.sell + self.strong_sell
    }

    /// Consensus label from the mean rating (strong sell = 1 ... strong buy = 5).
    pub fn consensus(&self) -> &'static str {
        let total = self.total();
        if total <= 0 {
            return "no_coverage";
        }
        let score = (self.strong_buy * 5 + self.buy * 4 + self.hold * 3 + self.sell * 2 + self.strong_sell)
            as f64
            / total as f64;
        match score {
            s if s >= 4.5 => "strong_buy",
            s if s >= 3.5 => "buy",
            s if s > 2.5 => "hold",
            s if s > 1.5 => "sell",
            _ => "strong_sell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsiderTransaction {
    #[serde(default)]
    pub name: String,
    /// Shares held after the transaction.
    #[serde(default)]
    pub share: i64,
    /// Signed share change.
    #[serde(default)]
    pub change: i64,
    #[serde(default)]
    pub filing_date: String,
    #[serde(default)]
    pub transaction_date: String,
    #[serde(default)]
    pub transaction_code: String,
    #[serde(default)]
    pub transaction_price: f64,
}

#[derive(Debug, Deserialize)]
struct InsiderResponse {
    #[serde(default)]
    data: Vec<InsiderTransaction>,
}

/// Recent insider activity plus its net share change.
#[derive(Debug, Clone, Serialize)]
pub struct InsiderSummary {
    pub net_shares: i64,
    pub buys: usize,
    pub sells: usize,
    pub transactions: Vec<InsiderTransaction>,
}

impl InsiderSummary {
    pub fn from_transactions(transactions: Vec<InsiderTransaction>) -> Self {
        Self {
            net_shares: transactions.iter().map(|t| t.change).sum(),
            buys: transactions.iter().filter(|t| t.change > 0).count(),
            sells: transactions.iter().filter(|t| t.change < 0).count(),
            transactions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    /// Unix seconds.
    #[serde(default)]
    pub datetime: i64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FinnhubClient {
    http: Client,
    api_key: Option<SecretString>,
}

impl FinnhubClient {
    pub fn new(api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Finnhub HTTP client")?;
        Ok(Self { http, api_key })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let key = self
            .api_key
            .as_ref()
            .context("Finnhub API key not configured")?;

        let mut url = format!("{FINNHUB_API_URL}{path}?");
        for (name, value) in params {
            url.push_str(&format!("{name}={}&", urlencoding::encode(value)));
        }
        debug!(url = %url, "Finnhub request");
        url.push_str(&format!("token={}", key.expose_secret()));

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Finnhub request failed: {path}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Finnhub API error {status} for {path}");
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse Finnhub response for {path}"))
    }

    /// Quote for a raw Finnhub symbol. Finnhub answers unknown symbols with
    /// an all-zero quote, which maps to `None`.
    pub async fn fetch_quote(&self, symbol: &str, ticker: &str) -> Result<Option<Quote>> {
        let q: QuoteResponse = self.get("/quote", &[("symbol", symbol)]).await?;
        Ok(quote_from_response(ticker, q))
    }

    pub async fn profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        let profile: CompanyProfile = self.get("/stock/profile2", &[("symbol", ticker)]).await?;
        Ok((!profile.name.is_empty() || !profile.ticker.is_empty()).then_some(profile))
    }

    pub async fn news_sentiment(&self, ticker: &str) -> Result<NewsSentiment> {
        self.get("/news-sentiment", &[("symbol", ticker)]).await
    }

    /// Most recent recommendation period.
    pub async fn recommendation(&self, ticker: &str) -> Result<Option<RecommendationTrend>> {
        let mut trends: Vec<RecommendationTrend> =
            self.get("/stock/recommendation", &[("symbol", ticker)]).await?;
        trends.sort_by(|a, b| b.period.cmp(&a.period));
        Ok(trends.into_iter().next())
    }

    pub async fn insider_transactions(&self, ticker: &str) -> Result<InsiderSummary> {
        let resp: InsiderResponse = self
            .get("/stock/insider-transactions", &[("symbol", ticker)])
            .await?;
        Ok(InsiderSummary::from_transactions(resp.data))
    }

    pub async fn company_news(&self, ticker: &str, from: NaiveDate, to: NaiveDate, limit: usize) -> Result<Vec<NewsArticle>> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let mut articles: Vec<NewsArticle> = self
            .get("/company-news", &[("symbol", ticker), ("from", &from), ("to", &to)])
            .await?;
        articles.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        articles.truncate(limit);
        Ok(articles)
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn quote(&self, ticker: &str, category: PickCategory) -> Result<Option<Quote>> {
        let symbol = finnhub_symbol(ticker, category);
        self.fetch_quote(&symbol, ticker).await
    }
}

/// Map a pick ticker to the symbol Finnhub quotes it under.
pub fn finnhub_symbol(ticker: &str, category: PickCategory) -> String {
    let ticker = ticker.trim().to_uppercase();
    match category {
        PickCategory::Crypto if !ticker.contains(':') => {
            let base = ticker.trim_end_matches("-USD").trim_end_matches("USDT").trim_end_matches("USD");
            format!("BINANCE:{base}USDT")
        }
        _ => ticker,
    }
}

fn quote_from_response(ticker: &str, q: QuoteResponse) -> Option<Quote> {
    if q.c <= 0.0 {
        return None;
    }
    let timestamp: DateTime<Utc> = Utc.timestamp_opt(q.t, 0).single().unwrap_or_else(Utc::now);
    Some(Quote {
        ticker: ticker.to_uppercase(),
        price: q.c,
        change: q.d.unwrap_or(0.0),
        change_percent: q.dp.unwrap_or(0.0),
        high: q.h,
        low: q.l,
        open: q.o,
        previous_close: q.pc,
        timestamp,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
