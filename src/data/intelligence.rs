//! Per-ticker stock intelligence aggregate.
//!
//! Issues every provider call for one ticker concurrently and folds the
//! results into a single report. A failing part is logged and reported as
//! `null`; the report itself only fails if the ticker is unusable.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::alphavantage::{AlphaVantageClient, Technicals};
use super::finnhub::{CompanyProfile, FinnhubClient, InsiderSummary, NewsArticle, NewsSentiment, RecommendationTrend};
use crate::types::{PickCategory, Quote};

const NEWS_LOOKBACK_DAYS: i64 = 7;
const NEWS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct StockIntelligence {
    pub ticker: String,
    pub quote: Option<Quote>,
    pub profile: Option<CompanyProfile>,
    pub sentiment: Option<NewsSentiment>,
    pub recommendation: Option<RecommendationTrend>,
    pub analyst_consensus: Option<&'static str>,
    pub insider: Option<InsiderSummary>,
    pub insider_net_shares: Option<i64>,
    pub news: Option<Vec<NewsArticle>>,
    pub technicals: Option<Technicals>,
    pub fetched_at: DateTime<Utc>,
}

/// Normalize a user-supplied ticker; `None` if nothing usable remains.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    (!ticker.is_empty() && ticker.len() <= 12).then_some(ticker)
}

fn part<T>(name: &str, ticker: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(part = name, ticker, error = %e, "Intelligence part unavailable");
            None
        }
    }
}

pub struct IntelligenceService {
    finnhub: Arc<FinnhubClient>,
    alpha_vantage: Arc<AlphaVantageClient>,
}

impl IntelligenceService {
    pub fn new(finnhub: Arc<FinnhubClient>, alpha_vantage: Arc<AlphaVantageClient>) -> Self {
        Self { finnhub, alpha_vantage }
    }

    pub async fn gather(&self, ticker: &str) -> StockIntelligence {
        let now = Utc::now();
        let from = (now - Duration::days(NEWS_LOOKBACK_DAYS)).date_naive();
        let to = now.date_naive();
        let symbol = super::finnhub::finnhub_symbol(ticker, PickCategory::Stock);

        let (quote, profile, sentiment, recommendation, insider, news, technicals) = tokio::join!(
            self.finnhub.fetch_quote(&symbol, ticker),
            self.finnhub.profile(ticker),
            self.finnhub.news_sentiment(ticker),
            self.finnhub.recommendation(ticker),
            self.finnhub.insider_transactions(ticker),
            self.finnhub.company_news(ticker, from, to, NEWS_LIMIT),
            self.alpha_vantage.technicals(ticker),
        );

        let recommendation = part("recommendation", ticker, recommendation).flatten();
        let insider = part("insider", ticker, insider);
        let report = StockIntelligence {
            ticker: ticker.to_string(),
            quote: part("quote", ticker, quote).flatten(),
            profile: part("profile", ticker, profile).flatten(),
            sentiment: part("sentiment", ticker, sentiment),
            analyst_consensus: recommendation.as_ref().map(RecommendationTrend::consensus),
            recommendation,
            insider_net_shares: insider.as_ref().map(|i| i.net_shares),
            insider,
            news: part("news", ticker, news),
            technicals: part("technicals", ticker, technicals).filter(|t| !t.is_empty()),
            fetched_at: now,
        };

        info!(
            ticker,
            has_quote = report.quote.is_some(),
            has_technicals = report.technicals.is_some(),
            "Stock intelligence gathered"
        );
        report
    }
}
