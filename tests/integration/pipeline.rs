//! Weekly pick lifecycle: generation -> expiry resolution -> leaderboard.

use chrono::{Duration, Utc};
use std::sync::Arc;

use market_oracle::config::{CompetitionConfig, ModelConfig};
use market_oracle::engine::calibration::{calibrate_all, CalibrationDiagnosis};
use market_oracle::engine::generator::{sync_models, PickGenerator};
use market_oracle::engine::leaderboard::{leaderboard, recompute_all};
use market_oracle::engine::tracker::OutcomeTracker;
use market_oracle::storage::{PickFilter, Store};
use market_oracle::types::{PickCategory, PickResult, PickStatus};

use crate::mock_providers::{model_entry, MockQuotes, ScriptedModel};

const ALPHA_REPLY: &str = r#"```json
[
  {"ticker": "AAPL", "confidence": 80, "entry_price": 100, "target_price": 110, "reasoning": "Services growth"},
  {"ticker": "xyz", "confidence": "60", "entry_price": 50, "target_price": 45, "reasoning": "Overextended"}
]
```"#;

const BETA_REPLY: &str =
    r#"My picks: [{"ticker": "AAPL", "confidence": 90, "entry_price": 100, "target_price": 120}]"#;

fn model_config(id: &str) -> ModelConfig {
    ModelConfig {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        provider: "openai".to_string(),
        model: "scripted-1".to_string(),
        api_key_env: "UNUSED".to_string(),
        max_tokens: None,
        base_url: None,
    }
}

fn stock_only() -> CompetitionConfig {
    CompetitionConfig {
        categories: vec![PickCategory::Stock],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_generation_resolution_leaderboard() {
    let store = Store::in_memory().await.unwrap();
    sync_models(&store, &[model_config("alpha"), model_config("beta")]).await.unwrap();

    let quotes = MockQuotes::with_prices(&[("AAPL", 100.0), ("XYZ", 50.0)]);
    let alpha = Arc::new(ScriptedModel::new(ALPHA_REPLY));
    let beta = Arc::new(ScriptedModel::new(BETA_REPLY));
    let generator = PickGenerator::new(
        store.clone(),
        stock_only(),
        vec![model_entry("alpha", alpha.clone()), model_entry("beta", beta.clone())],
        quotes.clone(),
    );

    let now = Utc::now();
    let report = generator.run_generation(now).await.unwrap();
    assert_eq!(report.week_number, 1);
    assert_eq!(report.picks_created, 3);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    // Same week: no new provider calls, no new picks
    let rerun = generator.run_generation(now + Duration::days(2)).await.unwrap();
    assert_eq!(rerun.picks_created, 0);
    assert_eq!(rerun.skipped.len(), 2);
    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 1);

    // Nothing has expired yet
    let tracker = OutcomeTracker::new(store.clone(), quotes.clone());
    assert_eq!(tracker.process_expired(now + Duration::days(1)).await.unwrap().processed, 0);

    // AAPL rallies to 112, XYZ drops to 40
    quotes.set("AAPL", 112.0);
    quotes.set("XYZ", 40.0);
    let later = now + Duration::days(8);
    let outcome = tracker.process_expired(later).await.unwrap();
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.wins, 2);
    assert_eq!(outcome.losses, 1);

    let picks = store.list_picks(&PickFilter::default()).await.unwrap();
    assert!(picks.iter().all(|p| p.status == PickStatus::Expired));
    let xyz = picks.iter().find(|p| p.ticker == "XYZ").unwrap();
    assert_eq!(xyz.result, Some(PickResult::Win));
    assert!((xyz.profit_loss_percent.unwrap() - 20.0).abs() < 1e-9);

    // Stored counters agree with a full recompute
    let before = leaderboard(&store).await.unwrap();
    recompute_all(&store).await.unwrap();
    let after = leaderboard(&store).await.unwrap();
    assert_eq!(before.len(), 2);
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.model.id, a.model.id);
        assert_eq!(b.model.wins, a.model.wins);
        assert_eq!(b.model.losses, a.model.losses);
        assert!((b.model.total_profit_loss - a.model.total_profit_loss).abs() < 1e-9);
    }

    let top = &after[0];
    assert_eq!(top.rank, 1);
    assert_eq!(top.model.id, "alpha");
    assert_eq!(top.model.win_rate, 100.0);
    assert_eq!(top.model.total_picks, 2);
    assert_eq!(top.model.best_streak, 2);
    assert!((top.model.total_profit_loss - 32.0).abs() < 1e-9);

    let bottom = &after[1];
    assert_eq!(bottom.model.id, "beta");
    assert_eq!(bottom.model.win_rate, 0.0);
    assert_eq!(bottom.model.current_streak, -1);

    // Too few points for a diagnosis, but the report still covers every model
    let calibration = calibrate_all(&store).await.unwrap();
    assert_eq!(calibration.len(), 2);
    assert!(calibration
        .iter()
        .all(|c| c.report.diagnosis == CalibrationDiagnosis::InsufficientData));
}

#[tokio::test]
async fn test_next_week_generates_fresh_picks() {
    let store = Store::in_memory().await.unwrap();
    sync_models(&store, &[model_config("beta")]).await.unwrap();
    let quotes = MockQuotes::with_prices(&[]);
    let beta = Arc::new(ScriptedModel::new(BETA_REPLY));
    let generator = PickGenerator::new(store.clone(), stock_only(), vec![model_entry("beta", beta)], quotes);

    let now = Utc::now();
    generator.run_generation(now).await.unwrap();
    let week2 = generator.run_generation(now + Duration::days(7)).await.unwrap();
    assert_eq!(week2.week_number, 2);
    assert_eq!(week2.picks_created, 1);

    let filter = PickFilter { week_number: Some(2), ..Default::default() };
    assert_eq!(store.list_picks(&filter).await.unwrap().len(), 1);
    assert_eq!(store.get_model("beta").await.unwrap().unwrap().total_picks, 2);
}

#[tokio::test]
async fn test_provider_failure_does_not_stop_others() {
    let store = Store::in_memory().await.unwrap();
    sync_models(&store, &[model_config("alpha"), model_config("down")]).await.unwrap();
    let generator = PickGenerator::new(
        store.clone(),
        stock_only(),
        vec![
            model_entry("alpha", Arc::new(ScriptedModel::new(ALPHA_REPLY))),
            model_entry("down", Arc::new(ScriptedModel::new(""))),
        ],
        MockQuotes::with_prices(&[]),
    );

    let report = generator.run_generation(Utc::now()).await.unwrap();
    assert_eq!(report.picks_created, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("down/stock: "));
    assert!(report.errors[0].contains("503"));
}

#[tokio::test]
async fn test_quote_outage_keeps_picks_active() {
    let store = Store::in_memory().await.unwrap();
    sync_models(&store, &[model_config("beta")]).await.unwrap();
    let quotes = MockQuotes::with_prices(&[("AAPL", 100.0)]);
    let generator = PickGenerator::new(
        store.clone(),
        stock_only(),
        vec![model_entry("beta", Arc::new(ScriptedModel::new(BETA_REPLY)))],
        quotes.clone(),
    );
    let now = Utc::now();
    generator.run_generation(now).await.unwrap();

    quotes.set_error("finnhub unavailable");
    let tracker = OutcomeTracker::new(store.clone(), quotes.clone());
    let report = tracker.process_expired(now + Duration::days(8)).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.errors.len(), 1);

    let model = store.get_model("beta").await.unwrap().unwrap();
    assert_eq!(model.wins + model.losses, 0);
    let active = PickFilter { status: Some(PickStatus::Active), ..Default::default() };
    assert_eq!(store.list_picks(&active).await.unwrap().len(), 1);
}
