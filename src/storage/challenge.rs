//! Challenge enrollments, holdings and the paper-trade log.
//!
//! Money columns are stored as TEXT and decoded into `Decimal`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{parse_decimal, Store};
use crate::types::{ChallengeTrade, Enrollment, EnrollmentStatus, Holding};

#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: String,
    user_id: String,
    challenge_id: String,
    starting_balance: String,
    balance: String,
    portfolio_value: String,
    total_return_percent: f64,
    current_day: i64,
    trades_count: i64,
    milestones_count: i64,
    milestones_achieved: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    final_rank: Option<i64>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = anyhow::Error;

    fn try_from(row: EnrollmentRow) -> Result<Self> {
        let milestones_achieved: Vec<String> = serde_json::from_str(&row.milestones_achieved)
            .with_context(|| format!("Invalid milestone list on enrollment {}", row.id))?;
        Ok(Enrollment {
            starting_balance: parse_decimal("starting_balance", &row.starting_balance)?,
            balance: parse_decimal("balance", &row.balance)?,
            portfolio_value: parse_decimal("portfolio_value", &row.portfolio_value)?,
            id: row.id,
            user_id: row.user_id,
            challenge_id: row.challenge_id,
            total_return_percent: row.total_return_percent,
            current_day: row.current_day,
            trades_count: row.trades_count,
            milestones_count: row.milestones_count,
            milestones_achieved,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            final_rank: row.final_rank,
        })
    }
}

#[derive(Debug, FromRow)]
struct HoldingRow {
    enrollment_id: String,
    ticker: String,
    quantity: String,
    avg_price: String,
    last_price: String,
}

impl TryFrom<HoldingRow> for Holding {
    type Error = anyhow::Error;

    fn try_from(row: HoldingRow) -> Result<Self> {
        Ok(Holding {
            quantity: parse_decimal("quantity", &row.quantity)?,
            avg_price: parse_decimal("avg_price", &row.avg_price)?,
            last_price: parse_decimal("last_price", &row.last_price)?,
            enrollment_id: row.enrollment_id,
            ticker: row.ticker,
        })
    }
}

#[derive(Debug, FromRow)]
struct TradeRow {
    id: String,
    enrollment_id: String,
    ticker: String,
    side: String,
    quantity: String,
    price: String,
    executed_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for ChallengeTrade {
    type Error = anyhow::Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(ChallengeTrade {
            side: row.side.parse()?,
            quantity: parse_decimal("quantity", &row.quantity)?,
            price: parse_decimal("price", &row.price)?,
            id: row.id,
            enrollment_id: row.enrollment_id,
            ticker: row.ticker,
            executed_at: row.executed_at,
        })
    }
}

const ENROLLMENT_COLUMNS: &str = "id, user_id, challenge_id, starting_balance, balance, \
    portfolio_value, total_return_percent, current_day, trades_count, milestones_count, \
    milestones_achieved, status, started_at, completed_at, final_rank";

impl Store {
    pub async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let achieved = serde_json::to_string(&enrollment.milestones_achieved)?;
        sqlx::query(&format!(
            "INSERT INTO enrollments ({ENROLLMENT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&enrollment.id)
        .bind(&enrollment.user_id)
        .bind(&enrollment.challenge_id)
        .bind(enrollment.starting_balance.to_string())
        .bind(enrollment.balance.to_string())
        .bind(enrollment.portfolio_value.to_string())
        .bind(enrollment.total_return_percent)
        .bind(enrollment.current_day)
        .bind(enrollment.trades_count)
        .bind(enrollment.milestones_count)
        .bind(achieved)
        .bind(enrollment.status.as_str())
        .bind(enrollment.started_at)
        .bind(enrollment.completed_at)
        .bind(enrollment.final_rank)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert enrollment for {}", enrollment.user_id))?;
        Ok(())
    }

    /// Write back every mutable enrollment field.
    pub async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let achieved = serde_json::to_string(&enrollment.milestones_achieved)?;
        sqlx::query(
            "UPDATE enrollments SET balance = ?, portfolio_value = ?, total_return_percent = ?, \
             current_day = ?, trades_count = ?, milestones_count = ?, milestones_achieved = ?, \
             status = ?, completed_at = ?, final_rank = ? WHERE id = ?",
        )
        .bind(enrollment.balance.to_string())
        .bind(enrollment.portfolio_value.to_string())
        .bind(enrollment.total_return_percent)
        .bind(enrollment.current_day)
        .bind(enrollment.trades_count)
        .bind(enrollment.milestones_count)
        .bind(achieved)
        .bind(enrollment.status.as_str())
        .bind(enrollment.completed_at)
        .bind(enrollment.final_rank)
        .bind(&enrollment.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save enrollment {}", enrollment.id))?;
        Ok(())
    }

    pub async fn active_enrollment(&self, user_id: &str, challenge_id: &str) -> Result<Option<Enrollment>> {
        let row: Option<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE user_id = ? AND challenge_id = ? AND status = ? \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(challenge_id)
        .bind(EnrollmentStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load active enrollment")?;
        row.map(Enrollment::try_from).transpose()
    }

    /// Most recent enrollment regardless of status.
    pub async fn latest_enrollment(&self, user_id: &str, challenge_id: &str) -> Result<Option<Enrollment>> {
        let row: Option<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE user_id = ? AND challenge_id = ? ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load enrollment")?;
        row.map(Enrollment::try_from).transpose()
    }

    /// All non-abandoned enrollments of a challenge.
    pub async fn ranked_enrollments(&self, challenge_id: &str) -> Result<Vec<Enrollment>> {
        let rows: Vec<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE challenge_id = ? AND status != ? \
             ORDER BY total_return_percent DESC, started_at"
        ))
        .bind(challenge_id)
        .bind(EnrollmentStatus::Abandoned.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enrollments")?;
        rows.into_iter().map(Enrollment::try_from).collect()
    }

    // -- Holdings --------------------------------------------------------

    pub async fn holdings(&self, enrollment_id: &str) -> Result<Vec<Holding>> {
        let rows: Vec<HoldingRow> = sqlx::query_as(
            "SELECT enrollment_id, ticker, quantity, avg_price, last_price FROM holdings \
             WHERE enrollment_id = ? ORDER BY ticker",
        )
        .bind(enrollment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load holdings")?;
        rows.into_iter().map(Holding::try_from).collect()
    }

    pub async fn upsert_holding(&self, holding: &Holding) -> Result<()> {
        sqlx::query(
            "INSERT INTO holdings (enrollment_id, ticker, quantity, avg_price, last_price) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT(enrollment_id, ticker) DO UPDATE SET \
             quantity = excluded.quantity, avg_price = excluded.avg_price, \
             last_price = excluded.last_price",
        )
        .bind(&holding.enrollment_id)
        .bind(&holding.ticker)
        .bind(holding.quantity.to_string())
        .bind(holding.avg_price.to_string())
        .bind(holding.last_price.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save holding")?;
        Ok(())
    }

    pub async fn delete_holding(&self, enrollment_id: &str, ticker: &str) -> Result<()> {
        sqlx::query("DELETE FROM holdings WHERE enrollment_id = ? AND ticker = ?")
            .bind(enrollment_id)
            .bind(ticker)
            .execute(&self.pool)
            .await
            .context("Failed to delete holding")?;
        Ok(())
    }

    // -- Trades ----------------------------------------------------------

    pub async fn insert_trade(&self, trade: &ChallengeTrade) -> Result<()> {
        sqlx::query(
            "INSERT INTO challenge_trades (id, enrollment_id, ticker, side, quantity, price, executed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trade.id)
        .bind(&trade.enrollment_id)
        .bind(&trade.ticker)
        .bind(trade.side.as_str())
        .bind(trade.quantity.to_string())
        .bind(trade.price.to_string())
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await
        .context("Failed to record trade")?;
        Ok(())
    }

    pub async fn trades(&self, enrollment_id: &str, limit: i64) -> Result<Vec<ChallengeTrade>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT id, enrollment_id, ticker, side, quantity, price, executed_at \
             FROM challenge_trades WHERE enrollment_id = ? ORDER BY executed_at DESC LIMIT ?",
        )
        .bind(enrollment_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load trades")?;
        rows.into_iter().map(ChallengeTrade::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeSide;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_enrollment_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let mut e = Enrollment::new("user-1", "90-day", dec!(100000), Utc::now());
        store.insert_enrollment(&e).await.unwrap();

        e.balance = dec!(95000.25);
        e.milestones_achieved.push("first_trade".into());
        e.milestones_count = 1;
        store.save_enrollment(&e).await.unwrap();

        let loaded = store.active_enrollment("user-1", "90-day").await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(95000.25));
        assert_eq!(loaded.milestones_achieved, vec!["first_trade".to_string()]);
        assert!(store.active_enrollment("user-2", "90-day").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_enrollment_not_active() {
        let store = Store::in_memory().await.unwrap();
        let mut e = Enrollment::new("user-1", "90-day", dec!(1000), Utc::now());
        store.insert_enrollment(&e).await.unwrap();
        e.status = EnrollmentStatus::Completed;
        store.save_enrollment(&e).await.unwrap();

        assert!(store.active_enrollment("user-1", "90-day").await.unwrap().is_none());
        let latest = store.latest_enrollment("user-1", "90-day").await.unwrap().unwrap();
        assert_eq!(latest.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_holdings_upsert_and_delete() {
        let store = Store::in_memory().await.unwrap();
        let e = Enrollment::new("user-1", "90-day", dec!(1000), Utc::now());
        store.insert_enrollment(&e).await.unwrap();

        let mut h = Holding {
            enrollment_id: e.id.clone(),
            ticker: "AAPL".into(),
            quantity: dec!(2),
            avg_price: dec!(150),
            last_price: dec!(150),
        };
        store.upsert_holding(&h).await.unwrap();
        h.quantity = dec!(5);
        store.upsert_holding(&h).await.unwrap();

        let holdings = store.holdings(&e.id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, dec!(5));

        store.delete_holding(&e.id, "AAPL").await.unwrap();
        assert!(store.holdings(&e.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trade_log() {
        let store = Store::in_memory().await.unwrap();
        let e = Enrollment::new("user-1", "90-day", dec!(1000), Utc::now());
        store.insert_enrollment(&e).await.unwrap();

        let trade = ChallengeTrade {
            id: "t1".into(),
            enrollment_id: e.id.clone(),
            ticker: "TSLA".into(),
            side: TradeSide::Buy,
            quantity: dec!(1.5),
            price: dec!(200),
            executed_at: Utc::now(),
        };
        store.insert_trade(&trade).await.unwrap();
        let trades = store.trades(&e.id, 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].notional(), dec!(300));
    }
}
