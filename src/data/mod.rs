//! Market and economic data providers.
//!
//! Thin clients over Finnhub (quotes, company data), Alpha Vantage
//! (technical indicators), FRED (macro series) and CoinGecko (crypto market
//! totals). Each normalizes provider JSON into the crate's own shapes and
//! derives a handful of threshold labels.
//!
//! `QuoteProvider` is the seam the pick engine and the challenge use for
//! live prices, so both can run against fixed prices in tests.

pub mod alphavantage;
pub mod crypto;
pub mod economics;
pub mod finnhub;
pub mod intelligence;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{PickCategory, Quote};

/// Source of current prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Current quote for `ticker`, or `None` if the provider has no data for it.
    async fn quote(&self, ticker: &str, category: PickCategory) -> Result<Option<Quote>>;
}

/// Shared HTTP user agent for data providers.
pub(crate) const USER_AGENT: &str = concat!("market-oracle/", env!("CARGO_PKG_VERSION"));
