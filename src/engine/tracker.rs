//! Outcome tracker: resolves expired picks against live prices.
//!
//! A pick moves `active -> expired` exactly once. The store guards the
//! write with `result IS NULL`, and model counters are only touched when
//! that guarded write actually changed the row.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::leaderboard::ModelStats;
use crate::data::QuoteProvider;
use crate::error::{ApiError, ApiResult};
use crate::storage::Store;
use crate::types::{Pick, PickResult};

/// Signed percent move from entry to exit, in the pick's favour.
pub fn profit_loss_percent(entry: f64, exit: f64, bearish: bool) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    let raw = (exit - entry) / entry * 100.0;
    if bearish {
        -raw
    } else {
        raw
    }
}

/// Classify a pick at `price`: bullish picks win at or above target,
/// bearish picks at or below it.
pub fn evaluate(pick: &Pick, price: f64) -> (PickResult, f64) {
    let bearish = pick.is_bearish();
    let won = if bearish {
        price <= pick.target_price
    } else {
        price >= pick.target_price
    };
    let result = if won { PickResult::Win } else { PickResult::Loss };
    (result, profit_loss_percent(pick.entry_price, price, bearish))
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPick {
    pub pick_id: String,
    pub model_id: String,
    pub ticker: String,
    pub result: PickResult,
    pub entry_price: f64,
    pub target_price: f64,
    pub exit_price: f64,
    pub profit_loss_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeReport {
    pub processed: usize,
    pub wins: usize,
    pub losses: usize,
    pub resolved: Vec<ResolvedPick>,
    pub errors: Vec<String>,
}

pub struct OutcomeTracker {
    store: Store,
    quotes: Arc<dyn QuoteProvider>,
}

impl OutcomeTracker {
    pub fn new(store: Store, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { store, quotes }
    }

    /// Resolve every active pick whose expiry has passed.
    pub async fn process_expired(&self, now: DateTime<Utc>) -> Result<OutcomeReport> {
        let expired = self.store.expired_active_picks(now).await?;
        let mut report = OutcomeReport::default();

        for pick in &expired {
            report.processed += 1;
            let price = match self.quotes.quote(&pick.ticker, pick.category).await {
                Ok(Some(q)) => q.price,
                Ok(None) => {
                    report.errors.push(format!("{}: no quote for {}", pick.id, pick.ticker));
                    continue;
                }
                Err(e) => {
                    warn!(pick_id = %pick.id, ticker = %pick.ticker, error = %e, "Quote fetch failed");
                    report.errors.push(format!("{}: {e}", pick.id));
                    continue;
                }
            };

            match self.resolve(pick, price, now).await {
                Ok(Some(resolved)) => {
                    match resolved.result {
                        PickResult::Win => report.wins += 1,
                        PickResult::Loss => report.losses += 1,
                    }
                    report.resolved.push(resolved);
                }
                Ok(None) => {}
                Err(e) => report.errors.push(format!("{}: {e:#}", pick.id)),
            }
        }

        info!(
            processed = report.processed,
            wins = report.wins,
            losses = report.losses,
            errors = report.errors.len(),
            "Outcome processing complete"
        );
        Ok(report)
    }

    /// Resolve one pick now, regardless of expiry, optionally at a given price.
    pub async fn force_resolve(
        &self,
        pick_id: &str,
        price_override: Option<f64>,
        now: DateTime<Utc>,
    ) -> ApiResult<ResolvedPick> {
        let pick = self
            .store
            .get_pick(pick_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Pick not found: {pick_id}")))?;

        if pick.result.is_some() {
            return Err(ApiError::BadRequest(format!("Pick already resolved: {pick_id}")));
        }

        let price = match price_override {
            Some(p) if p.is_finite() && p > 0.0 => p,
            Some(_) => return Err(ApiError::BadRequest("exit_price must be positive".into())),
            None => self
                .quotes
                .quote(&pick.ticker, pick.category)
                .await?
                .map(|q| q.price)
                .ok_or_else(|| ApiError::NotFound(format!("No quote available for {}", pick.ticker)))?,
        };

        self.resolve(&pick, price, now)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("Pick already resolved: {pick_id}")))
    }

    async fn resolve(&self, pick: &Pick, price: f64, now: DateTime<Utc>) -> Result<Option<ResolvedPick>> {
        let (result, pnl) = evaluate(pick, price);

        if !self.store.resolve_pick(&pick.id, result, price, pnl, now).await? {
            return Ok(None);
        }

        match self.store.get_model(&pick.model_id).await? {
            Some(mut model) => {
                let mut stats = ModelStats::of(&model);
                stats.record(result, pnl);
                stats.apply_to(&mut model);
                self.store.save_model_stats(&model).await?;
            }
            None => warn!(model_id = %pick.model_id, "Resolved pick for unknown model"),
        }

        info!(
            pick_id = %pick.id,
            ticker = %pick.ticker,
            result = %result,
            exit = price,
            pnl,
            "Pick resolved"
        );

        Ok(Some(ResolvedPick {
            pick_id: pick.id.clone(),
            model_id: pick.model_id.clone(),
            ticker: pick.ticker.clone(),
            result,
            entry_price: pick.entry_price,
            target_price: pick.target_price,
            exit_price: price,
            profit_loss_percent: pnl,
        }))
    }
}
