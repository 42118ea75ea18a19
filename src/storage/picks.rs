//! Competitions, model records and picks.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Store;
use crate::types::{
    Competition, CompetitionStatus, ModelRecord, Pick, PickCategory, PickResult, PickStatus,
};

#[derive(Debug, FromRow)]
struct CompetitionRow {
    id: String,
    name: String,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl TryFrom<CompetitionRow> for Competition {
    type Error = anyhow::Error;

    fn try_from(row: CompetitionRow) -> Result<Self> {
        Ok(Competition {
            id: row.id,
            name: row.name,
            status: row.status.parse()?,
            start_date: row.start_date,
            end_date: row.end_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct ModelRow {
    id: String,
    display_name: String,
    provider: String,
    total_picks: i64,
    wins: i64,
    losses: i64,
    win_rate: f64,
    current_streak: i64,
    best_streak: i64,
    total_profit_loss: f64,
}

impl From<ModelRow> for ModelRecord {
    fn from(row: ModelRow) -> Self {
        ModelRecord {
            id: row.id,
            display_name: row.display_name,
            provider: row.provider,
            total_picks: row.total_picks,
            wins: row.wins,
            losses: row.losses,
            win_rate: row.win_rate,
            current_streak: row.current_streak,
            best_streak: row.best_streak,
            total_profit_loss: row.total_profit_loss,
        }
    }
}

#[derive(Debug, FromRow)]
struct PickRow {
    id: String,
    competition_id: String,
    model_id: String,
    ticker: String,
    category: String,
    confidence: f64,
    entry_price: f64,
    target_price: f64,
    reasoning: String,
    week_number: i64,
    picked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    result: Option<String>,
    exit_price: Option<f64>,
    profit_loss_percent: Option<f64>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<PickRow> for Pick {
    type Error = anyhow::Error;

    fn try_from(row: PickRow) -> Result<Self> {
        Ok(Pick {
            id: row.id,
            competition_id: row.competition_id,
            model_id: row.model_id,
            ticker: row.ticker,
            category: row.category.parse()?,
            confidence: row.confidence,
            entry_price: row.entry_price,
            target_price: row.target_price,
            reasoning: row.reasoning,
            week_number: row.week_number,
            picked_at: row.picked_at,
            expires_at: row.expires_at,
            status: row.status.parse()?,
            result: row.result.as_deref().map(str::parse::<PickResult>).transpose()?,
            exit_price: row.exit_price,
            profit_loss_percent: row.profit_loss_percent,
            resolved_at: row.resolved_at,
        })
    }
}

const PICK_COLUMNS: &str = "id, competition_id, model_id, ticker, category, confidence, \
    entry_price, target_price, reasoning, week_number, picked_at, expires_at, status, \
    result, exit_price, profit_loss_percent, resolved_at";

const MODEL_COLUMNS: &str = "id, display_name, provider, total_picks, wins, losses, win_rate, \
    current_streak, best_streak, total_profit_loss";

/// Optional filters for listing picks.
#[derive(Debug, Clone, Default)]
pub struct PickFilter {
    pub competition_id: Option<String>,
    pub model_id: Option<String>,
    pub week_number: Option<i64>,
    pub category: Option<PickCategory>,
    pub status: Option<PickStatus>,
    pub limit: Option<i64>,
}

fn collect_picks(rows: Vec<PickRow>) -> Result<Vec<Pick>> {
    rows.into_iter().map(Pick::try_from).collect()
}

impl Store {
    // -- Competitions ----------------------------------------------------

    pub async fn active_competition(&self) -> Result<Option<Competition>> {
        let row: Option<CompetitionRow> = sqlx::query_as(
            "SELECT id, name, status, start_date, end_date FROM competitions \
             WHERE status = 'active' ORDER BY start_date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load active competition")?;

        row.map(Competition::try_from).transpose()
    }

    pub async fn get_competition(&self, id: &str) -> Result<Option<Competition>> {
        let row: Option<CompetitionRow> = sqlx::query_as(
            "SELECT id, name, status, start_date, end_date FROM competitions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load competition")?;

        row.map(Competition::try_from).transpose()
    }

    pub async fn insert_competition(&self, competition: &Competition) -> Result<()> {
        sqlx::query(
            "INSERT INTO competitions (id, name, status, start_date, end_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&competition.id)
        .bind(&competition.name)
        .bind(competition.status.as_str())
        .bind(competition.start_date)
        .bind(competition.end_date)
        .execute(&self.pool)
        .await
        .context("Failed to insert competition")?;
        Ok(())
    }

    pub async fn end_competition(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE competitions SET status = ? WHERE id = ?")
            .bind(CompetitionStatus::Ended.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to end competition")?;
        Ok(())
    }

    // -- Models ----------------------------------------------------------

    /// Insert a model record, or refresh its display fields if it exists.
    /// Counters are never touched here.
    pub async fn upsert_model(&self, id: &str, display_name: &str, provider: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_models (id, display_name, provider) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, \
             provider = excluded.provider",
        )
        .bind(id)
        .bind(display_name)
        .bind(provider)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert model {id}"))?;
        Ok(())
    }

    pub async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>> {
        let row: Option<ModelRow> =
            sqlx::query_as(&format!("SELECT {MODEL_COLUMNS} FROM ai_models WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load model")?;
        Ok(row.map(ModelRecord::from))
    }

    pub async fn list_models(&self) -> Result<Vec<ModelRecord>> {
        let rows: Vec<ModelRow> =
            sqlx::query_as(&format!("SELECT {MODEL_COLUMNS} FROM ai_models ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .context("Failed to list models")?;
        Ok(rows.into_iter().map(ModelRecord::from).collect())
    }

    /// Overwrite a model's aggregate counters.
    pub async fn save_model_stats(&self, model: &ModelRecord) -> Result<()> {
        sqlx::query(
            "UPDATE ai_models SET total_picks = ?, wins = ?, losses = ?, win_rate = ?, \
             current_streak = ?, best_streak = ?, total_profit_loss = ? WHERE id = ?",
        )
        .bind(model.total_picks)
        .bind(model.wins)
        .bind(model.losses)
        .bind(model.win_rate)
        .bind(model.current_streak)
        .bind(model.best_streak)
        .bind(model.total_profit_loss)
        .bind(&model.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save stats for model {}", model.id))?;
        Ok(())
    }

    pub async fn increment_model_picks(&self, id: &str, count: i64) -> Result<()> {
        sqlx::query("UPDATE ai_models SET total_picks = total_picks + ? WHERE id = ?")
            .bind(count)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to increment model pick count")?;
        Ok(())
    }

    // -- Picks -----------------------------------------------------------

    pub async fn insert_pick(&self, pick: &Pick) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO picks ({PICK_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&pick.id)
        .bind(&pick.competition_id)
        .bind(&pick.model_id)
        .bind(&pick.ticker)
        .bind(pick.category.as_str())
        .bind(pick.confidence)
        .bind(pick.entry_price)
        .bind(pick.target_price)
        .bind(&pick.reasoning)
        .bind(pick.week_number)
        .bind(pick.picked_at)
        .bind(pick.expires_at)
        .bind(pick.status.as_str())
        .bind(pick.result.map(|r| r.as_str()))
        .bind(pick.exit_price)
        .bind(pick.profit_loss_percent)
        .bind(pick.resolved_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert pick {} ({})", pick.id, pick.ticker))?;
        Ok(())
    }

    pub async fn get_pick(&self, id: &str) -> Result<Option<Pick>> {
        let row: Option<PickRow> =
            sqlx::query_as(&format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load pick")?;
        row.map(Pick::try_from).transpose()
    }

    /// Number of picks already stored for one generation slot.
    pub async fn count_picks_in_slot(
        &self,
        competition_id: &str,
        model_id: &str,
        category: PickCategory,
        week_number: i64,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM picks WHERE competition_id = ? AND model_id = ? \
             AND category = ? AND week_number = ?",
        )
        .bind(competition_id)
        .bind(model_id)
        .bind(category.as_str())
        .bind(week_number)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count picks")?;
        Ok(count)
    }

    pub async fn count_picks_for_model(&self, model_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM picks WHERE model_id = ?")
            .bind(model_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count model picks")?;
        Ok(count)
    }

    pub async fn list_picks(&self, filter: &PickFilter) -> Result<Vec<Pick>> {
        let mut sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE 1 = 1");
        if filter.competition_id.is_some() {
            sql.push_str(" AND competition_id = ?");
        }
        if filter.model_id.is_some() {
            sql.push_str(" AND model_id = ?");
        }
        if filter.week_number.is_some() {
            sql.push_str(" AND week_number = ?");
        }
        if filter.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY picked_at DESC, model_id, ticker LIMIT ?");

        let mut query = sqlx::query_as::<_, PickRow>(&sql);
        if let Some(id) = &filter.competition_id {
            query = query.bind(id);
        }
        if let Some(id) = &filter.model_id {
            query = query.bind(id);
        }
        if let Some(week) = filter.week_number {
            query = query.bind(week);
        }
        if let Some(category) = filter.category {
            query = query.bind(category.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(filter.limit.unwrap_or(500));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list picks")?;
        collect_picks(rows)
    }

    /// Active picks whose expiry is at or before `now`.
    pub async fn expired_active_picks(&self, now: DateTime<Utc>) -> Result<Vec<Pick>> {
        let rows: Vec<PickRow> = sqlx::query_as(&format!(
            "SELECT {PICK_COLUMNS} FROM picks WHERE status = 'active' AND result IS NULL \
             ORDER BY expires_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load active picks")?;

        // Expiry is compared in Rust rather than as TEXT in SQL.
        Ok(collect_picks(rows)?
            .into_iter()
            .filter(|p| p.is_expired_at(now))
            .collect())
    }

    /// Set a pick's result. Returns false if the pick was already resolved
    /// (or does not exist); the result is written at most once.
    pub async fn resolve_pick(
        &self,
        id: &str,
        result: PickResult,
        exit_price: f64,
        profit_loss_percent: f64,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE picks SET status = ?, result = ?, exit_price = ?, profit_loss_percent = ?, \
             resolved_at = ? WHERE id = ? AND result IS NULL",
        )
        .bind(PickStatus::Expired.as_str())
        .bind(result.as_str())
        .bind(exit_price)
        .bind(profit_loss_percent)
        .bind(resolved_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to resolve pick {id}"))?;

        Ok(outcome.rows_affected() == 1)
    }

    /// A model's resolved picks in resolution order.
    pub async fn resolved_picks_for_model(&self, model_id: &str) -> Result<Vec<Pick>> {
        let rows: Vec<PickRow> = sqlx::query_as(&format!(
            "SELECT {PICK_COLUMNS} FROM picks WHERE model_id = ? AND result IS NOT NULL \
             ORDER BY resolved_at, id"
        ))
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load resolved picks")?;
        collect_picks(rows)
    }
}
