//! Weekly pick generation.
//!
//! For each configured category, every model is prompted concurrently.
//! Replies are parsed leniently and stored as picks tied to the active
//! competition and week. A model/category slot that already holds picks
//! for the week is left alone, so re-running in the same week is a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ModelEntry;
use crate::config::{CompetitionConfig, ModelConfig};
use crate::data::QuoteProvider;
use crate::picks::{pick_prompt, try_parse_picks, SYSTEM_PROMPT};
use crate::storage::Store;
use crate::types::{Competition, CompetitionStatus, Pick, PickCategory, PickStatus};

/// Return the active competition, rolling over or creating one as needed.
pub async fn ensure_active_competition(
    store: &Store,
    config: &CompetitionConfig,
    now: DateTime<Utc>,
) -> Result<Competition> {
    if let Some(current) = store.active_competition().await? {
        if current.end_date > now {
            return Ok(current);
        }
        info!(competition_id = %current.id, "Competition ended; starting a new one");
        store.end_competition(&current.id).await?;
    }

    let competition = Competition {
        id: uuid::Uuid::new_v4().to_string(),
        name: format!("Market Oracle Competition {}", now.format("%Y-%m-%d")),
        status: CompetitionStatus::Active,
        start_date: now,
        end_date: now + Duration::weeks(config.duration_weeks.max(1)),
    };
    store.insert_competition(&competition).await?;
    info!(competition_id = %competition.id, end = %competition.end_date, "Competition created");
    Ok(competition)
}

/// Make sure every configured model has an `ai_models` row.
pub async fn sync_models(store: &Store, models: &[ModelConfig]) -> Result<()> {
    for model in models {
        store
            .upsert_model(&model.id, &model.display_name, &model.provider)
            .await
            .with_context(|| format!("Failed to register model {}", model.id))?;
    }
    debug!(count = models.len(), "Models registered");
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub competition_id: String,
    pub week_number: i64,
    pub picks_created: usize,
    /// "model/category" slots that already had picks this week.
    pub skipped: Vec<String>,
    /// "model/category: error" for provider or parse failures.
    pub errors: Vec<String>,
}

enum SlotOutcome {
    Created(usize),
    Skipped,
}

pub struct PickGenerator {
    store: Store,
    config: CompetitionConfig,
    models: Vec<ModelEntry>,
    quotes: Arc<dyn QuoteProvider>,
}

impl PickGenerator {
    pub fn new(
        store: Store,
        config: CompetitionConfig,
        models: Vec<ModelEntry>,
        quotes: Arc<dyn QuoteProvider>,
    ) -> Self {
        Self { store, config, models, quotes }
    }

    pub async fn run_generation(&self, now: DateTime<Utc>) -> Result<GenerationReport> {
        let competition = ensure_active_competition(&self.store, &self.config, now).await?;
        let week = competition.week_number(now);

        let mut report = GenerationReport {
            competition_id: competition.id.clone(),
            week_number: week,
            ..Default::default()
        };

        if self.models.is_empty() {
            warn!("No models with API keys configured; nothing to generate");
        }

        for &category in &self.config.categories {
            let results = join_all(
                self.models
                    .iter()
                    .map(|model| self.generate_slot(model, &competition, category, week, now)),
            )
            .await;

            for (model, result) in self.models.iter().zip(results) {
                match result {
                    Ok(SlotOutcome::Created(n)) => report.picks_created += n,
                    Ok(SlotOutcome::Skipped) => report.skipped.push(format!("{}/{}", model.id, category)),
                    Err(e) => {
                        warn!(model = %model.id, %category, error = %e, "Pick generation failed");
                        report.errors.push(format!("{}/{}: {e:#}", model.id, category));
                    }
                }
            }
        }

        info!(
            competition_id = %report.competition_id,
            week = report.week_number,
            created = report.picks_created,
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Pick generation complete"
        );
        Ok(report)
    }

    async fn generate_slot(
        &self,
        model: &ModelEntry,
        competition: &Competition,
        category: PickCategory,
        week: i64,
        now: DateTime<Utc>,
    ) -> Result<SlotOutcome> {
        let existing = self
            .store
            .count_picks_in_slot(&competition.id, &model.id, category, week)
            .await?;
        if existing > 0 {
            debug!(model = %model.id, %category, week, "Slot already filled");
            return Ok(SlotOutcome::Skipped);
        }

        let count = self.config.picks_per_category;
        let prompt = pick_prompt(category, count, week, self.config.pick_horizon_days);
        let completion = model.client.generate(SYSTEM_PROMPT, &prompt).await?;
        debug!(model = %model.id, tokens = completion.tokens, cost = completion.cost, "Completion received");

        let parsed = try_parse_picks(&completion.text, count)?;
        if parsed.is_empty() {
            anyhow::bail!("No usable picks in response");
        }

        let expires_at = now + Duration::days(self.config.pick_horizon_days);
        let mut created = 0;
        for p in parsed {
            let entry_price = if p.entry_price > 0.0 {
                p.entry_price
            } else {
                self.live_price(&p.ticker, category).await.unwrap_or(p.entry_price)
            };

            let pick = Pick {
                id: uuid::Uuid::new_v4().to_string(),
                competition_id: competition.id.clone(),
                model_id: model.id.clone(),
                ticker: p.ticker,
                category,
                confidence: p.confidence,
                entry_price,
                target_price: p.target_price,
                reasoning: p.reasoning,
                week_number: week,
                picked_at: now,
                expires_at,
                status: PickStatus::Active,
                result: None,
                exit_price: None,
                profit_loss_percent: None,
                resolved_at: None,
            };
            self.store.insert_pick(&pick).await?;
            debug!(%pick, "Pick stored");
            created += 1;
        }

        self.store.increment_model_picks(&model.id, created as i64).await?;
        Ok(SlotOutcome::Created(created))
    }

    async fn live_price(&self, ticker: &str, category: PickCategory) -> Option<f64> {
        match self.quotes.quote(ticker, category).await {
            Ok(quote) => quote.map(|q| q.price),
            Err(e) => {
                warn!(ticker, error = %e, "Entry price lookup failed");
                None
            }
        }
    }
}
