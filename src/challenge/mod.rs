//! 90-day paper-trading challenge.
//!
//! Users enroll with a virtual cash balance, trade equities at live quotes
//! and earn credits for milestones and final placement. Money is kept in
//! `Decimal`; percentages are plain `f64`.

pub mod milestones;
pub mod prizes;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ChallengeConfig;
use crate::credits::{CreditLedger, MILESTONE_REWARD, PRIZE};
use crate::data::QuoteProvider;
use crate::error::{ApiError, ApiResult};
use crate::storage::Store;
use crate::types::{d, ChallengeTrade, Enrollment, EnrollmentStatus, Holding, PickCategory, TradeSide};

use milestones::{newly_achieved, total_reward, MilestoneRule};
use prizes::Prize;

const RECENT_TRADES: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeStatus {
    pub enrollment: Enrollment,
    pub holdings: Vec<Holding>,
    pub recent_trades: Vec<ChallengeTrade>,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub trade: ChallengeTrade,
    pub enrollment: Enrollment,
}

#[derive(Debug, Clone, Serialize)]
pub struct MilestoneCheck {
    pub enrollment: Enrollment,
    pub newly_achieved: Vec<MilestoneRule>,
    pub credits_awarded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub enrollment: Enrollment,
    pub rank: i64,
    pub prize: Option<Prize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Standing {
    pub rank: i64,
    pub user_id: String,
    pub status: EnrollmentStatus,
    pub current_day: i64,
    pub portfolio_value: Decimal,
    pub total_return_percent: f64,
    pub prize: Option<Prize>,
}

/// Challenge day for `now`: 1 on the start date, capped at the duration.
pub fn challenge_day(started_at: DateTime<Utc>, now: DateTime<Utc>, duration_days: i64) -> i64 {
    ((now - started_at).num_days() + 1).clamp(1, duration_days.max(1))
}

/// Recompute portfolio value and return from cash plus marked holdings.
pub fn apply_valuation(enrollment: &mut Enrollment, holdings: &[Holding]) {
    let invested: Decimal = holdings.iter().map(Holding::market_value).sum();
    enrollment.portfolio_value = enrollment.balance + invested;
    enrollment.total_return_percent = if enrollment.starting_balance.is_zero() {
        0.0
    } else {
        ((enrollment.portfolio_value - enrollment.starting_balance) / enrollment.starting_balance
            * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    };
}

pub struct ChallengeService {
    store: Store,
    quotes: Arc<dyn QuoteProvider>,
    credits: CreditLedger,
    config: ChallengeConfig,
}

impl ChallengeService {
    pub fn new(store: Store, quotes: Arc<dyn QuoteProvider>, credits: CreditLedger, config: ChallengeConfig) -> Self {
        Self { store, quotes, credits, config }
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    async fn require_active(&self, user_id: &str) -> ApiResult<Enrollment> {
        self.store
            .active_enrollment(user_id, &self.config.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("No active challenge enrollment".into()))
    }

    pub async fn status(&self, user_id: &str) -> ApiResult<ChallengeStatus> {
        let enrollment = self
            .store
            .latest_enrollment(user_id, &self.config.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Not enrolled in the challenge".into()))?;
        let holdings = self.store.holdings(&enrollment.id).await?;
        let recent_trades = self.store.trades(&enrollment.id, RECENT_TRADES).await?;
        let days_remaining = if enrollment.is_active() {
            (self.config.duration_days - enrollment.current_day).max(0)
        } else {
            0
        };
        Ok(ChallengeStatus { enrollment, holdings, recent_trades, days_remaining })
    }

    pub async fn enroll(&self, user_id: &str, now: DateTime<Utc>) -> ApiResult<Enrollment> {
        if self.store.active_enrollment(user_id, &self.config.id).await?.is_some() {
            return Err(ApiError::BadRequest("Already enrolled in an active challenge".into()));
        }
        let enrollment = Enrollment::new(user_id, &self.config.id, d(self.config.starting_balance), now);
        self.store.insert_enrollment(&enrollment).await?;
        // Touch the ledger so starting credits exist from day one.
        self.credits.balance(user_id).await?;
        info!(user_id, enrollment_id = %enrollment.id, "Challenge enrollment created");
        Ok(enrollment)
    }

    pub async fn trade(&self, user_id: &str, request: &TradeRequest, now: DateTime<Utc>) -> ApiResult<TradeOutcome> {
        let ticker = crate::data::intelligence::normalize_ticker(&request.ticker)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid ticker: {}", request.ticker)))?;
        if request.quantity <= Decimal::ZERO {
            return Err(ApiError::BadRequest("quantity must be positive".into()));
        }

        let mut enrollment = self.require_active(user_id).await?;
        let quote = self
            .quotes
            .quote(&ticker, PickCategory::Stock)
            .await?
            .filter(|q| q.price > 0.0)
            .ok_or_else(|| ApiError::NotFound(format!("No quote available for {ticker}")))?;
        let price = d(quote.price);
        let notional = request
            .quantity
            .checked_mul(price)
            .ok_or_else(|| ApiError::BadRequest("quantity too large".into()))?;

        let mut holdings = self.store.holdings(&enrollment.id).await?;
        let position = holdings.iter().position(|h| h.ticker == ticker);

        match request.side {
            TradeSide::Buy => {
                if enrollment.balance < notional {
                    return Err(ApiError::BadRequest(format!(
                        "Insufficient cash: {notional} required, {} available",
                        enrollment.balance
                    )));
                }
                enrollment.balance -= notional;
                let holding = match position {
                    Some(i) => {
                        let h = &mut holdings[i];
                        let quantity = h.quantity + request.quantity;
                        let cost_basis = h
                            .quantity
                            .checked_mul(h.avg_price)
                            .and_then(|basis| basis.checked_add(notional))
                            .ok_or_else(|| ApiError::BadRequest("quantity too large".into()))?;
                        h.avg_price = cost_basis / quantity;
                        h.quantity = quantity;
                        h.last_price = price;
                        h.clone()
                    }
                    None => {
                        let h = Holding {
                            enrollment_id: enrollment.id.clone(),
                            ticker: ticker.clone(),
                            quantity: request.quantity,
                            avg_price: price,
                            last_price: price,
                        };
                        holdings.push(h.clone());
                        h
                    }
                };
                self.store.upsert_holding(&holding).await?;
            }
            TradeSide::Sell => {
                let i = position
                    .filter(|&i| holdings[i].quantity >= request.quantity)
                    .ok_or_else(|| ApiError::BadRequest(format!("Insufficient {ticker} shares to sell")))?;
                enrollment.balance += notional;
                let h = &mut holdings[i];
                h.quantity -= request.quantity;
                h.last_price = price;
                if h.quantity.is_zero() {
                    self.store.delete_holding(&enrollment.id, &ticker).await?;
                    holdings.remove(i);
                } else {
                    self.store.upsert_holding(h).await?;
                }
            }
        }

        let trade = ChallengeTrade {
            id: uuid::Uuid::new_v4().to_string(),
            enrollment_id: enrollment.id.clone(),
            ticker: ticker.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            executed_at: now,
        };
        self.store.insert_trade(&trade).await?;

        enrollment.trades_count += 1;
        enrollment.current_day = challenge_day(enrollment.started_at, now, self.config.duration_days);
        apply_valuation(&mut enrollment, &holdings);
        self.store.save_enrollment(&enrollment).await?;

        info!(user_id, %ticker, side = %request.side, quantity = %request.quantity, %price, "Paper trade executed");
        Ok(TradeOutcome { trade, enrollment })
    }

    /// Mark holdings to fresh quotes, keeping the last price when a quote is unavailable.
    async fn revalue(&self, enrollment: &mut Enrollment, now: DateTime<Utc>) -> Result<()> {
        let mut holdings = self.store.holdings(&enrollment.id).await?;
        for holding in &mut holdings {
            match self.quotes.quote(&holding.ticker, PickCategory::Stock).await {
                Ok(Some(q)) if q.price > 0.0 => {
                    holding.last_price = d(q.price);
                    self.store.upsert_holding(holding).await?;
                }
                Ok(_) => {}
                Err(e) => warn!(ticker = %holding.ticker, error = %e, "Revaluation quote failed; keeping last price"),
            }
        }
        enrollment.current_day = challenge_day(enrollment.started_at, now, self.config.duration_days);
        apply_valuation(enrollment, &holdings);
        Ok(())
    }

    pub async fn check_milestones(&self, user_id: &str, now: DateTime<Utc>) -> ApiResult<MilestoneCheck> {
        let mut enrollment = self.require_active(user_id).await?;
        self.revalue(&mut enrollment, now).await?;

        let achieved: Vec<MilestoneRule> = newly_achieved(&self.config.milestones, &enrollment)
            .into_iter()
            .cloned()
            .collect();
        let credits_awarded = total_reward(&achieved.iter().collect::<Vec<_>>());

        enrollment
            .milestones_achieved
            .extend(achieved.iter().map(|rule| rule.name.clone()));
        enrollment.milestones_count = enrollment.milestones_achieved.len() as i64;
        self.store.save_enrollment(&enrollment).await?;

        for rule in achieved.iter().filter(|rule| rule.reward > 0) {
            self.credits
                .award(user_id, rule.reward, MILESTONE_REWARD, &format!("Milestone: {}", rule.name))
                .await?;
            info!(user_id, milestone = %rule.name, reward = rule.reward, "Milestone achieved");
        }

        Ok(MilestoneCheck { enrollment, newly_achieved: achieved, credits_awarded })
    }

    pub async fn complete(&self, user_id: &str, now: DateTime<Utc>) -> ApiResult<CompletionResult> {
        let mut enrollment = self.require_active(user_id).await?;
        self.revalue(&mut enrollment, now).await?;
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.completed_at = Some(now);
        self.store.save_enrollment(&enrollment).await?;

        let ranked = self.store.ranked_enrollments(&self.config.id).await?;
        let rank = ranked
            .iter()
            .position(|e| e.id == enrollment.id)
            .map(|i| i as i64 + 1)
            .ok_or_else(|| anyhow::anyhow!("Completed enrollment missing from ranking"))?;
        enrollment.final_rank = Some(rank);
        self.store.save_enrollment(&enrollment).await?;

        let prize = self.config.prizes.for_rank(rank).cloned();
        if let Some(prize) = prize.as_ref().filter(|p| p.credits > 0) {
            self.credits
                .award(user_id, prize.credits, PRIZE, &format!("Challenge prize: {}", prize.label))
                .await?;
        }

        info!(user_id, rank, return_pct = enrollment.total_return_percent, "Challenge completed");
        Ok(CompletionResult { enrollment, rank, prize })
    }

    pub async fn abandon(&self, user_id: &str, now: DateTime<Utc>) -> ApiResult<Enrollment> {
        let mut enrollment = self.require_active(user_id).await?;
        enrollment.status = EnrollmentStatus::Abandoned;
        enrollment.completed_at = Some(now);
        self.store.save_enrollment(&enrollment).await?;
        info!(user_id, enrollment_id = %enrollment.id, "Challenge abandoned");
        Ok(enrollment)
    }

    /// Non-abandoned enrollments ranked by return, with the prize each rank earns.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Standing>> {
        let ranked = self.store.ranked_enrollments(&self.config.id).await?;
        Ok(ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, e)| {
                let rank = i as i64 + 1;
                Standing {
                    rank,
                    user_id: e.user_id,
                    status: e.status,
                    current_day: e.current_day,
                    portfolio_value: e.portfolio_value,
                    total_return_percent: e.total_return_percent,
                    prize: self.config.prizes.for_rank(rank).cloned(),
                }
            })
            .collect())
    }
}
