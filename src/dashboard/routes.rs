//! API route handlers.
//!
//! All endpoints return the JSON envelope from [`crate::error`]. State is
//! shared via `Arc<AppContext>`.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRef, FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderMap},
    Json,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::challenge::{
    ChallengeService, ChallengeStatus, CompletionResult, MilestoneCheck, Standing, TradeOutcome, TradeRequest,
};
use crate::config::AppConfig;
use crate::credits::CreditLedger;
use crate::data::alphavantage::AlphaVantageClient;
use crate::data::crypto::{CoinGeckoClient, CryptoMarketStats};
use crate::data::economics::{EconomicSnapshot, EconomicsProvider};
use crate::data::finnhub::FinnhubClient;
use crate::data::intelligence::{normalize_ticker, IntelligenceService, StockIntelligence};
use crate::data::QuoteProvider;
use crate::engine::calibration::{calibrate_all, ModelCalibration};
use crate::engine::generator::{GenerationReport, PickGenerator};
use crate::engine::leaderboard::{leaderboard, recompute_all, LeaderboardEntry};
use crate::engine::scenario::{run_scenario, ScenarioOutcome, ScenarioRequest};
use crate::engine::tracker::{OutcomeReport, OutcomeTracker, ResolvedPick};
use crate::engine::ModelEntry;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::storage::{PickFilter, Store};
use crate::types::{Competition, CreditTransaction, Enrollment, ModelRecord, Pick};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a handler can reach.
pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub models: Vec<ModelEntry>,
    pub generator: PickGenerator,
    pub tracker: OutcomeTracker,
    pub intelligence: IntelligenceService,
    pub economics: EconomicsProvider,
    pub crypto: Option<CoinGeckoClient>,
    pub challenge: ChallengeService,
    pub credits: CreditLedger,
    /// Bearer token for the cron endpoints. `None` locks them.
    pub cron_secret: Option<SecretString>,
}

impl AppContext {
    /// Wire every service from config. The one Finnhub client serves both
    /// quotes and stock intelligence; other provider keys are read from the
    /// environment variables the config names.
    pub fn new(config: AppConfig, store: Store, models: Vec<ModelEntry>, finnhub: Arc<FinnhubClient>) -> Result<Self> {
        let quotes: Arc<dyn QuoteProvider> = finnhub.clone();
        Self::with_quotes(config, store, models, finnhub, quotes)
    }

    /// Like [`AppContext::new`] with a separate quote source.
    pub fn with_quotes(
        config: AppConfig,
        store: Store,
        models: Vec<ModelEntry>,
        finnhub: Arc<FinnhubClient>,
        quotes: Arc<dyn QuoteProvider>,
    ) -> Result<Self> {
        let sources = &config.data_sources;
        let alpha_vantage =
            Arc::new(AlphaVantageClient::new(AppConfig::resolve_secret(&sources.alpha_vantage_key_env))?);
        let economics = EconomicsProvider::new(AppConfig::resolve_secret(&sources.fred_api_key_env))?;
        let crypto = if sources.coingecko_enabled {
            Some(CoinGeckoClient::new()?)
        } else {
            None
        };

        let credits = CreditLedger::new(store.clone(), config.challenge.starting_credits);
        let generator =
            PickGenerator::new(store.clone(), config.competition.clone(), models.clone(), quotes.clone());
        let tracker = OutcomeTracker::new(store.clone(), quotes.clone());
        let challenge = ChallengeService::new(store.clone(), quotes, credits.clone(), config.challenge.clone());
        let cron_secret = AppConfig::resolve_secret(&config.server.cron_secret_env);
        if cron_secret.is_none() {
            warn!(env = %config.server.cron_secret_env, "Cron secret not set; cron endpoints will reject all calls");
        }

        Ok(Self {
            intelligence: IntelligenceService::new(finnhub, alpha_vantage),
            economics,
            crypto,
            generator,
            tracker,
            challenge,
            credits,
            cron_secret,
            models,
            store,
            config,
        })
    }
}

pub type AppState = Arc<AppContext>;

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Check `Authorization: Bearer <secret>`.
pub fn authorize_cron(headers: &HeaderMap, secret: Option<&SecretString>) -> ApiResult<()> {
    let secret = secret.ok_or_else(|| ApiError::Unauthorized("Cron secret not configured".into()))?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
    if token != secret.expose_secret() {
        return Err(ApiError::Unauthorized("Invalid bearer token".into()));
    }
    Ok(())
}

/// Marker extractor for cron-only endpoints.
pub struct CronAuth;

#[async_trait]
impl<S> FromRequestParts<S> for CronAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        authorize_cron(&parts.headers, app.cron_secret.as_ref())?;
        Ok(CronAuth)
    }
}

/// Caller identity from the `x-user-id` header.
pub struct UserId(pub String);

pub const USER_ID_HEADER: &str = "x-user-id";

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".into()))
    }
}

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

fn ok<T: Serialize>(data: T) -> Reply<T> {
    Ok(ApiResponse::success(data))
}

// ---------------------------------------------------------------------------
// Cron: picks, outcomes, leaderboard
// ---------------------------------------------------------------------------

/// POST /api/picks/generate
pub async fn cron_generate(_auth: CronAuth, State(state): State<AppState>) -> Reply<GenerationReport> {
    info!("Pick generation triggered by cron");
    ok(state.generator.run_generation(Utc::now()).await?)
}

/// GET /api/picks/generate
pub async fn manual_generate(State(state): State<AppState>) -> Reply<GenerationReport> {
    if !state.config.server.allow_manual_trigger {
        return Err(ApiError::Forbidden("Manual generation is disabled".into()));
    }
    info!("Pick generation triggered manually");
    ok(state.generator.run_generation(Utc::now()).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct OutcomeRequest {
    pub pick_id: Option<String>,
    pub exit_price: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutcomeResponse {
    Batch(OutcomeReport),
    Single(ResolvedPick),
}

/// POST /api/outcomes
///
/// An empty body processes every expired pick; `{ "pick_id": .. }`
/// force-resolves one.
pub async fn process_outcomes(_auth: CronAuth, State(state): State<AppState>, body: Bytes) -> Reply<OutcomeResponse> {
    let request: OutcomeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        OutcomeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let now = Utc::now();
    match request.pick_id {
        Some(pick_id) => {
            let resolved = state.tracker.force_resolve(&pick_id, request.exit_price, now).await?;
            ok(OutcomeResponse::Single(resolved))
        }
        None => ok(OutcomeResponse::Batch(state.tracker.process_expired(now).await?)),
    }
}

/// POST /api/leaderboard/recompute
pub async fn recompute_leaderboard(_auth: CronAuth, State(state): State<AppState>) -> Reply<Vec<ModelRecord>> {
    ok(recompute_all(&state.store).await?)
}

// ---------------------------------------------------------------------------
// Public reads
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PickQuery {
    pub competition_id: Option<String>,
    pub model_id: Option<String>,
    pub week: Option<i64>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

impl PickQuery {
    fn into_filter(self) -> ApiResult<PickFilter> {
        let category = self
            .category
            .map(|c| c.parse())
            .transpose()
            .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;
        let status = self
            .status
            .map(|s| s.parse())
            .transpose()
            .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;
        Ok(PickFilter {
            competition_id: self.competition_id,
            model_id: self.model_id,
            week_number: self.week,
            category,
            status,
            limit: Some(self.limit.unwrap_or(100).clamp(1, 500)),
        })
    }
}

/// GET /api/picks
///
/// Defaults to the active competition when none is named.
pub async fn get_picks(
    State(state): State<AppState>,
    query: Result<Query<PickQuery>, QueryRejection>,
) -> Reply<Vec<Pick>> {
    let Query(query) = query?;
    let mut filter = query.into_filter()?;
    if filter.competition_id.is_none() {
        filter.competition_id = state.store.active_competition().await?.map(|c| c.id);
    }
    ok(state.store.list_picks(&filter).await?)
}

#[derive(Debug, Serialize)]
pub struct CompetitionResponse {
    #[serde(flatten)]
    pub competition: Competition,
    pub week_number: i64,
}

/// GET /api/competition
pub async fn get_competition(State(state): State<AppState>) -> Reply<CompetitionResponse> {
    let competition = state
        .store
        .active_competition()
        .await?
        .ok_or_else(|| ApiError::NotFound("No active competition".into()))?;
    let week_number = competition.week_number(Utc::now());
    ok(CompetitionResponse { competition, week_number })
}

/// GET /api/leaderboard
pub async fn get_leaderboard(State(state): State<AppState>) -> Reply<Vec<LeaderboardEntry>> {
    ok(leaderboard(&state.store).await?)
}

/// GET /api/calibration
pub async fn get_calibration(State(state): State<AppState>) -> Reply<Vec<ModelCalibration>> {
    ok(calibrate_all(&state.store).await?)
}

/// GET /api/economy
pub async fn get_economy(State(state): State<AppState>) -> Reply<EconomicSnapshot> {
    ok(state.economics.snapshot().await?)
}

/// GET /api/crypto
pub async fn get_crypto(State(state): State<AppState>) -> Reply<CryptoMarketStats> {
    let client = state
        .crypto
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Crypto market data is disabled".into()))?;
    ok(client.global_stats().await?)
}

/// GET /api/stocks/:ticker
pub async fn get_stock(
    State(state): State<AppState>,
    ticker: Result<Path<String>, PathRejection>,
) -> Reply<StockIntelligence> {
    let Path(ticker) = ticker?;
    let ticker = normalize_ticker(&ticker).ok_or_else(|| ApiError::BadRequest(format!("Invalid ticker: {ticker}")))?;
    ok(state.intelligence.gather(&ticker).await)
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/challenge/leaderboard
pub async fn get_challenge_leaderboard(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Reply<Vec<Standing>> {
    let Query(query) = query?;
    ok(state.challenge.leaderboard(query.limit.unwrap_or(50).clamp(1, 500)).await?)
}

#[derive(Debug, Serialize)]
pub struct ModelUsage {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub calls: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models: usize,
    pub scheduler_enabled: bool,
    /// Provider calls and approximate spend since startup.
    pub usage: Vec<ModelUsage>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let usage = state
        .models
        .iter()
        .map(|m| ModelUsage {
            id: m.id.clone(),
            provider: m.provider.clone(),
            model: m.client.model_name().to_string(),
            calls: m.client.usage().total_calls(),
            cost_usd: m.client.usage().cumulative_cost(),
        })
        .collect();
    Json(HealthResponse {
        status: "ok",
        models: state.models.len(),
        scheduler_enabled: state.config.scheduler.enabled,
        usage,
    })
}

// ---------------------------------------------------------------------------
// User-scoped: challenge, credits, scenarios
// ---------------------------------------------------------------------------

/// GET /api/challenge
pub async fn get_challenge(UserId(user): UserId, State(state): State<AppState>) -> Reply<ChallengeStatus> {
    ok(state.challenge.status(&user).await?)
}

/// POST /api/challenge/enroll
pub async fn enroll(UserId(user): UserId, State(state): State<AppState>) -> Reply<Enrollment> {
    ok(state.challenge.enroll(&user, Utc::now()).await?)
}

/// POST /api/challenge/trade
pub async fn trade(
    UserId(user): UserId,
    State(state): State<AppState>,
    request: Result<Json<TradeRequest>, JsonRejection>,
) -> Reply<TradeOutcome> {
    let Json(request) = request?;
    ok(state.challenge.trade(&user, &request, Utc::now()).await?)
}

/// POST /api/challenge/milestones
pub async fn check_milestones(UserId(user): UserId, State(state): State<AppState>) -> Reply<MilestoneCheck> {
    ok(state.challenge.check_milestones(&user, Utc::now()).await?)
}

/// POST /api/challenge/complete
pub async fn complete(UserId(user): UserId, State(state): State<AppState>) -> Reply<CompletionResult> {
    ok(state.challenge.complete(&user, Utc::now()).await?)
}

/// POST /api/challenge/abandon
pub async fn abandon(UserId(user): UserId, State(state): State<AppState>) -> Reply<Enrollment> {
    ok(state.challenge.abandon(&user, Utc::now()).await?)
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub balance: i64,
    pub history: Vec<CreditTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/credits
pub async fn get_credits(
    UserId(user): UserId,
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Reply<CreditsResponse> {
    let Query(query) = query?;
    let balance = state.credits.balance(&user).await?;
    let history = state.credits.history(&user, query.limit.unwrap_or(50).clamp(1, 500)).await?;
    ok(CreditsResponse { balance, history })
}

/// POST /api/scenario
pub async fn simulate_scenario(
    UserId(user): UserId,
    State(state): State<AppState>,
    request: Result<Json<ScenarioRequest>, JsonRejection>,
) -> Reply<ScenarioOutcome> {
    let Json(request) = request?;
    let cost = state.config.challenge.scenario_cost;
    ok(run_scenario(&state.credits, &state.models, &user, &request, cost).await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
