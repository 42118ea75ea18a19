//! Shared types for Market Oracle.
//!
//! These types form the data model used across all modules: the pick
//! competition (competitions, picks, models), the paper-trading challenge
//! (enrollments, holdings, trades) and the credit ledger. Storage rows are
//! converted into these types at the persistence boundary.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert an `f64` into a `Decimal`, falling back to zero for NaN/inf.
pub fn d(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Universe a weekly pick is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickCategory {
    /// Broad US equities.
    Stock,
    /// Low-priced equities (under $5).
    PennyStock,
    Crypto,
}

impl PickCategory {
    /// All known categories, in generation order.
    pub const ALL: &'static [PickCategory] = &[
        PickCategory::Stock,
        PickCategory::PennyStock,
        PickCategory::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PickCategory::Stock => "stock",
            PickCategory::PennyStock => "penny_stock",
            PickCategory::Crypto => "crypto",
        }
    }
}

impl fmt::Display for PickCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a category name (case-insensitive, a few aliases accepted).
impl std::str::FromStr for PickCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "stocks" | "equity" => Ok(PickCategory::Stock),
            "penny_stock" | "penny" | "penny_stocks" | "pennystock" => Ok(PickCategory::PennyStock),
            "crypto" | "cryptocurrency" => Ok(PickCategory::Crypto),
            _ => Err(anyhow::anyhow!("Unknown pick category: {s}")),
        }
    }
}

/// Pick lifecycle. A pick only ever moves `Active -> Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStatus {
    Active,
    Expired,
}

impl PickStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickStatus::Active => "active",
            PickStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PickStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PickStatus::Active),
            "expired" => Ok(PickStatus::Expired),
            _ => Err(anyhow::anyhow!("Unknown pick status: {s}")),
        }
    }
}

/// Resolved outcome of a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickResult {
    Win,
    Loss,
}

impl PickResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickResult::Win => "win",
            PickResult::Loss => "loss",
        }
    }
}

impl fmt::Display for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PickResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(PickResult::Win),
            "loss" => Ok(PickResult::Loss),
            _ => Err(anyhow::anyhow!("Unknown pick result: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    Active,
    Ended,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Active => "active",
            CompetitionStatus::Ended => "ended",
        }
    }
}

impl std::str::FromStr for CompetitionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CompetitionStatus::Active),
            "ended" => Ok(CompetitionStatus::Ended),
            _ => Err(anyhow::anyhow!("Unknown competition status: {s}")),
        }
    }
}

/// Paper-trading challenge enrollment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Abandoned,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            "abandoned" => Ok(EnrollmentStatus::Abandoned),
            _ => Err(anyhow::anyhow!("Unknown enrollment status: {s}")),
        }
    }
}

/// Trade direction in the paper-trading challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(anyhow::anyhow!("Unknown trade side: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Competition & picks
// ---------------------------------------------------------------------------

/// A bounded time window grouping picks for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub name: String,
    pub status: CompetitionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Competition {
    /// 1-based week index of `now` within this competition.
    pub fn week_number(&self, now: DateTime<Utc>) -> i64 {
        week_number(self.start_date, now)
    }
}

/// Weeks elapsed since `start`, counting the first week as 1.
pub fn week_number(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let days = (now - start).num_days().max(0);
    days / 7 + 1
}

/// A single ticker recommendation from one model for one category/week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub id: String,
    pub competition_id: String,
    pub model_id: String,
    pub ticker: String,
    pub category: PickCategory,
    /// Model-stated confidence, 0-100.
    pub confidence: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub reasoning: String,
    pub week_number: i64,
    pub picked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PickStatus,
    pub result: Option<PickResult>,
    pub exit_price: Option<f64>,
    pub profit_loss_percent: Option<f64>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} entry=${:.2} target=${:.2} conf={:.0}% (week {}, {})",
            self.model_id,
            self.category,
            self.ticker,
            self.entry_price,
            self.target_price,
            self.confidence,
            self.week_number,
            self.status,
        )
    }
}

impl Pick {
    /// Whether the pick predicts a price decline.
    pub fn is_bearish(&self) -> bool {
        self.target_price < self.entry_price
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An external text-generation provider tracked as a competitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub total_picks: i64,
    pub wins: i64,
    pub losses: i64,
    /// Percent, 0-100.
    pub win_rate: f64,
    /// Positive for a run of wins, negative for a run of losses.
    pub current_streak: i64,
    pub best_streak: i64,
    /// Sum of resolved picks' profit/loss percent.
    pub total_profit_loss: f64,
}

impl ModelRecord {
    pub fn new(id: &str, display_name: &str, provider: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            provider: provider.to_string(),
            total_picks: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            current_streak: 0,
            best_streak: 0,
            total_profit_loss: 0.0,
        }
    }

    pub fn resolved(&self) -> i64 {
        self.wins + self.losses
    }
}

impl fmt::Display for ModelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) W{}/L{} win_rate={:.1}% streak={} pnl={:+.2}%",
            self.display_name,
            self.provider,
            self.wins,
            self.losses,
            self.win_rate,
            self.current_streak,
            self.total_profit_loss,
        )
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Current quote for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// A quote carrying only a price (used when a provider reports nothing else).
    pub fn from_price(ticker: &str, price: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            price,
            change: 0.0,
            change_percent: 0.0,
            high: price,
            low: price,
            open: price,
            previous_close: price,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// A user's participation in the paper-trading challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub starting_balance: Decimal,
    /// Uninvested cash.
    pub balance: Decimal,
    /// Cash plus marked-to-market holdings.
    pub portfolio_value: Decimal,
    pub total_return_percent: f64,
    pub current_day: i64,
    pub trades_count: i64,
    pub milestones_count: i64,
    pub milestones_achieved: Vec<String>,
    pub status: EnrollmentStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_rank: Option<i64>,
}

impl Enrollment {
    pub fn new(user_id: &str, challenge_id: &str, starting_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            starting_balance,
            balance: starting_balance,
            portfolio_value: starting_balance,
            total_return_percent: 0.0,
            current_day: 1,
            trades_count: 0,
            milestones_count: 0,
            milestones_achieved: Vec::new(),
            status: EnrollmentStatus::Active,
            started_at: now,
            completed_at: None,
            final_rank: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    pub fn has_achieved(&self, milestone: &str) -> bool {
        self.milestones_achieved.iter().any(|m| m == milestone)
    }
}

/// A paper position held by an enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub enrollment_id: String,
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub last_price: Decimal,
}

impl Holding {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_price
    }
}

/// A logged paper trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeTrade {
    pub id: String,
    pub enrollment_id: String,
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl ChallengeTrade {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

// ---------------------------------------------------------------------------
// Credits
// ---------------------------------------------------------------------------

/// One append-only ledger entry. Positive amounts are credits, negative debits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub transaction_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_category_round_trip_names() {
        for cat in PickCategory::ALL {
            let parsed: PickCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, *cat);
        }
        assert_eq!("Penny".parse::<PickCategory>().unwrap(), PickCategory::PennyStock);
        assert!("bonds".parse::<PickCategory>().is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&PickCategory::PennyStock).unwrap();
        assert_eq!(json, "\"penny_stock\"");
    }

    #[test]
    fn test_week_number() {
        let start = Utc::now();
        assert_eq!(week_number(start, start), 1);
        assert_eq!(week_number(start, start + Duration::days(6)), 1);
        assert_eq!(week_number(start, start + Duration::days(7)), 2);
        assert_eq!(week_number(start, start + Duration::days(20)), 3);
        // Clock skew before the start never yields week 0
        assert_eq!(week_number(start, start - Duration::days(3)), 1);
    }

    #[test]
    fn test_pick_bearish() {
        let now = Utc::now();
        let mut pick = Pick {
            id: "p1".into(),
            competition_id: "c1".into(),
            model_id: "gpt-4o".into(),
            ticker: "AAPL".into(),
            category: PickCategory::Stock,
            confidence: 70.0,
            entry_price: 100.0,
            target_price: 110.0,
            reasoning: String::new(),
            week_number: 1,
            picked_at: now,
            expires_at: now + Duration::days(7),
            status: PickStatus::Active,
            result: None,
            exit_price: None,
            profit_loss_percent: None,
            resolved_at: None,
        };
        assert!(!pick.is_bearish());
        assert!(!pick.is_expired_at(now));
        assert!(pick.is_expired_at(now + Duration::days(7)));
        pick.target_price = 90.0;
        assert!(pick.is_bearish());
    }

    #[test]
    fn test_enrollment_new() {
        let e = Enrollment::new("user-1", "q4", dec!(100000), Utc::now());
        assert_eq!(e.balance, dec!(100000));
        assert_eq!(e.portfolio_value, dec!(100000));
        assert_eq!(e.current_day, 1);
        assert!(e.is_active());
        assert!(!e.has_achieved("first_trade"));
    }

    #[test]
    fn test_holding_market_value() {
        let h = Holding {
            enrollment_id: "e".into(),
            ticker: "MSFT".into(),
            quantity: dec!(3),
            avg_price: dec!(400),
            last_price: dec!(410.5),
        };
        assert_eq!(h.market_value(), dec!(1231.5));
    }

    #[test]
    fn test_d_helper() {
        assert_eq!(d(1.5), dec!(1.5));
        assert_eq!(d(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_model_record_display() {
        let mut m = ModelRecord::new("claude", "Claude", "anthropic");
        m.wins = 3;
        m.losses = 1;
        m.win_rate = 75.0;
        let s = format!("{m}");
        assert!(s.contains("Claude"));
        assert!(s.contains("75.0%"));
    }
}
