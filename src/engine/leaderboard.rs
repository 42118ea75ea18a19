//! Model leaderboard: per-model aggregates recomputed from resolved picks.

use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::info;

use crate::storage::Store;
use crate::types::{ModelRecord, PickResult};

/// Aggregates derived from a model's resolved picks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub wins: i64,
    pub losses: i64,
    pub total_profit_loss: f64,
    /// Positive for a win run, negative for a loss run.
    pub current_streak: i64,
    /// Longest win run seen.
    pub best_streak: i64,
}

impl ModelStats {
    /// Fold one outcome into the running totals.
    pub fn record(&mut self, result: PickResult, profit_loss_percent: f64) {
        self.total_profit_loss += profit_loss_percent;
        match result {
            PickResult::Win => {
                self.wins += 1;
                self.current_streak = if self.current_streak > 0 { self.current_streak + 1 } else { 1 };
                self.best_streak = self.best_streak.max(self.current_streak);
            }
            PickResult::Loss => {
                self.losses += 1;
                self.current_streak = if self.current_streak < 0 { self.current_streak - 1 } else { -1 };
            }
        }
    }

    /// Percent of resolved picks won; `None` when nothing has resolved.
    pub fn win_rate(&self) -> Option<f64> {
        let resolved = self.wins + self.losses;
        (resolved > 0).then(|| self.wins as f64 / resolved as f64 * 100.0)
    }

    /// Current counters of a stored model.
    pub fn of(model: &ModelRecord) -> Self {
        Self {
            wins: model.wins,
            losses: model.losses,
            total_profit_loss: model.total_profit_loss,
            current_streak: model.current_streak,
            best_streak: model.best_streak,
        }
    }

    /// Write these stats onto a model. The stored win rate is left alone
    /// when there is nothing to compute it from.
    pub fn apply_to(&self, model: &mut ModelRecord) {
        model.wins = self.wins;
        model.losses = self.losses;
        model.total_profit_loss = self.total_profit_loss;
        model.current_streak = self.current_streak;
        model.best_streak = self.best_streak;
        if let Some(rate) = self.win_rate() {
            model.win_rate = rate;
        }
    }
}

/// One pass over outcomes in resolution order.
pub fn compute_model_stats<I>(outcomes: I) -> ModelStats
where
    I: IntoIterator<Item = (PickResult, f64)>,
{
    let mut stats = ModelStats::default();
    for (result, pnl) in outcomes {
        stats.record(result, pnl);
    }
    stats
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub model: ModelRecord,
}

/// Order by win rate, then total P/L, then id; ranks are 1-based.
pub fn rank_models(mut models: Vec<ModelRecord>) -> Vec<LeaderboardEntry> {
    models.sort_by(|a, b| {
        b.win_rate
            .partial_cmp(&a.win_rate)
            .unwrap_or(Ordering::Equal)
            .then(b.total_profit_loss.partial_cmp(&a.total_profit_loss).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });
    models
        .into_iter()
        .enumerate()
        .map(|(i, model)| LeaderboardEntry { rank: i + 1, model })
        .collect()
}

/// Recompute and persist every model's aggregates from its resolved picks.
///
/// Not isolated from concurrent resolution; a later run converges.
pub async fn recompute_all(store: &Store) -> Result<Vec<ModelRecord>> {
    let mut models = store.list_models().await?;
    for model in &mut models {
        let picks = store.resolved_picks_for_model(&model.id).await?;
        let stats = compute_model_stats(
            picks
                .iter()
                .filter_map(|p| p.result.map(|r| (r, p.profit_loss_percent.unwrap_or(0.0)))),
        );
        stats.apply_to(model);
        model.total_picks = store.count_picks_for_model(&model.id).await?;
        store.save_model_stats(model).await?;
    }
    info!(models = models.len(), "Leaderboard recomputed");
    Ok(models)
}

pub async fn leaderboard(store: &Store) -> Result<Vec<LeaderboardEntry>> {
    Ok(rank_models(store.list_models().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use PickResult::{Loss, Win};

    #[test]
    fn test_streaks_and_totals() {
        let stats = compute_model_stats([
            (Win, 5.0),
            (Win, 3.0),
            (Win, 1.0),
            (Loss, -2.0),
            (Win, 4.0),
            (Win, 2.0),
        ]);
        assert_eq!(stats.wins, 5);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.best_streak, 3);
        assert!((stats.total_profit_loss - 13.0).abs() < 1e-9);
        assert!((stats.win_rate().unwrap() - 500.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_loss_streak_is_negative() {
        let stats = compute_model_stats([(Win, 1.0), (Loss, -1.0), (Loss, -1.0), (Loss, -1.0)]);
        assert_eq!(stats.current_streak, -3);
        assert_eq!(stats.best_streak, 1);
    }

    #[test]
    fn test_win_rate_untouched_without_resolutions() {
        let mut model = ModelRecord::new("m", "M", "openai");
        model.win_rate = 42.0;
        compute_model_stats(std::iter::empty()).apply_to(&mut model);
        assert_eq!(model.win_rate, 42.0);
        assert_eq!(model.wins, 0);
    }

    #[test]
    fn test_win_rate_formula() {
        let mut model = ModelRecord::new("m", "M", "openai");
        compute_model_stats([(Win, 1.0), (Loss, 0.0), (Loss, 0.0), (Win, 0.0)]).apply_to(&mut model);
        assert_eq!(model.win_rate, model.wins as f64 / (model.wins + model.losses) as f64 * 100.0);
        assert_eq!(model.win_rate, 50.0);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let outcomes = [(Win, 2.0), (Loss, -1.0), (Win, 3.0)];
        let mut incremental = ModelStats::default();
        for (r, p) in outcomes {
            incremental.record(r, p);
        }
        assert_eq!(incremental, compute_model_stats(outcomes));
    }

    #[test]
    fn test_rank_order() {
        let mut a = ModelRecord::new("a", "A", "openai");
        a.win_rate = 60.0;
        a.total_profit_loss = 1.0;
        let mut b = ModelRecord::new("b", "B", "anthropic");
        b.win_rate = 60.0;
        b.total_profit_loss = 9.0;
        let mut c = ModelRecord::new("c", "C", "gemini");
        c.win_rate = 75.0;

        let ranked = rank_models(vec![a, b, c]);
        let ids: Vec<(usize, &str)> = ranked.iter().map(|e| (e.rank, e.model.id.as_str())).collect();
        assert_eq!(ids, vec![(1, "c"), (2, "b"), (3, "a")]);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.upsert_model("m1", "Model One", "openai").await.unwrap();
        let first = recompute_all(&store).await.unwrap();
        let second = recompute_all(&store).await.unwrap();
        assert_eq!(first[0].wins, second[0].wins);
        assert_eq!(first[0].total_picks, 0);
    }
}
