//! HTTP surface end to end, driven in-process through `oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use market_oracle::config::AppConfig;
use market_oracle::dashboard::build_router;
use market_oracle::dashboard::routes::{AppContext, AppState};
use market_oracle::data::finnhub::FinnhubClient;
use market_oracle::engine::generator::sync_models;
use market_oracle::storage::Store;

use crate::mock_providers::{model_entry, MockQuotes, ScriptedModel};

const CRON: &str = "Bearer integration-secret";

const PICKS: &str = r#"[{"ticker": "NVDA", "confidence": 75, "entry_price": 120, "target_price": 135,
                         "reasoning": "Data-center demand"}]"#;

const CONFIG: &str = r#"
    [competition]
    categories = ["stock"]
    picks_per_category = 2

    [[models]]
    id = "oracle-1"
    display_name = "Oracle One"
    provider = "openai"
    model = "scripted-1"
    api_key_env = "UNUSED_KEY"

    [challenge]
    starting_credits = 25
    scenario_cost = 10
"#;

async fn app(quotes: Arc<MockQuotes>) -> Router {
    let config = AppConfig::parse(CONFIG).unwrap();
    let store = Store::in_memory().await.unwrap();
    sync_models(&store, &config.models).await.unwrap();
    let models = vec![model_entry("oracle-1", Arc::new(ScriptedModel::new(PICKS)))];

    let finnhub = Arc::new(FinnhubClient::new(None).unwrap());
    let mut ctx = AppContext::with_quotes(config, store, models, finnhub, quotes).unwrap();
    ctx.cron_secret = Some(SecretString::new("integration-secret".into()));
    let state: AppState = Arc::new(ctx);
    build_router(state)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn cron_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, CRON)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn user_post(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("x-user-id", user)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_pick_cycle_over_http() {
    let app = app(MockQuotes::with_prices(&[("NVDA", 120.0)])).await;

    let (status, body) = call(&app, cron_post("/api/picks/generate", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["picks_created"], 1);

    let (status, body) = call(&app, get("/api/competition")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["week_number"], 1);

    let (_, body) = call(&app, get("/api/picks?category=stock")).await;
    let picks = body["data"].as_array().unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0]["ticker"], "NVDA");
    let pick_id = picks[0]["id"].as_str().unwrap().to_string();

    // Force-resolve above target
    let (status, body) = call(&app, cron_post("/api/outcomes", json!({"pick_id": pick_id, "exit_price": 140.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "win");

    let (status, body) = call(&app, cron_post("/api/outcomes", json!({"pick_id": pick_id}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(&app, cron_post("/api/leaderboard/recompute", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["wins"], 1);

    let (_, body) = call(&app, get("/api/leaderboard")).await;
    assert_eq!(body["data"][0]["rank"], 1);
    assert_eq!(body["data"][0]["win_rate"], 100.0);

    let (status, body) = call(&app, get("/api/calibration")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["total_predictions"], 1);
}

#[tokio::test]
async fn test_cron_secret_enforced() {
    let app = app(MockQuotes::with_prices(&[])).await;
    let req = Request::post("/api/leaderboard/recompute")
        .header(header::AUTHORIZATION, "Bearer guess")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid bearer token");
}

#[tokio::test]
async fn test_unknown_pick_is_404() {
    let app = app(MockQuotes::with_prices(&[])).await;
    let (status, _) = call(&app, cron_post("/api/outcomes", json!({"pick_id": "missing"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_challenge_over_http() {
    let app = app(MockQuotes::with_prices(&[("AAPL", 200.0)])).await;

    let (status, _) = call(&app, get("/api/challenge")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, user_post("/api/challenge/enroll", "erin", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, _) = call(&app, user_post("/api/challenge/enroll", "erin", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let trade = json!({"ticker": "aapl", "side": "buy", "quantity": 10});
    let (status, body) = call(&app, user_post("/api/challenge/trade", "erin", trade)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["trade"]["ticker"], "AAPL");
    assert_eq!(body["data"]["enrollment"]["trades_count"], 1);

    let too_big = json!({"ticker": "AAPL", "side": "buy", "quantity": 1000});
    let (status, _) = call(&app, user_post("/api/challenge/trade", "erin", too_big)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = json!({"ticker": "NOPE", "side": "buy", "quantity": 1});
    let (status, _) = call(&app, user_post("/api/challenge/trade", "erin", unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, user_post("/api/challenge/milestones", "erin", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["credits_awarded"], 50);

    let req = Request::get("/api/challenge").header("x-user-id", "erin").body(Body::empty()).unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["holdings"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["recent_trades"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, user_post("/api/challenge/complete", "erin", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rank"], 1);

    let (_, body) = call(&app, get("/api/challenge/leaderboard")).await;
    assert_eq!(body["data"][0]["user_id"], "erin");
    assert_eq!(body["data"][0]["prize"]["label"], "1st Place");
}

#[tokio::test]
async fn test_scenario_spends_credits_until_broke() {
    let app = app(MockQuotes::with_prices(&[])).await;
    let scenario = json!({"scenario": "The Fed cuts rates by 50bp", "tickers": ["QQQ"]});

    let (status, body) = call(&app, user_post("/api/scenario", "frank", scenario.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["overall_impact"], "positive");
    assert_eq!(body["data"]["affected_assets"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["credits_remaining"], 15);

    let (status, _) = call(&app, user_post("/api/scenario", "frank", scenario.clone())).await;
    assert_eq!(status, StatusCode::OK);

    // 5 credits left, a run costs 10
    let (status, body) = call(&app, user_post("/api/scenario", "frank", scenario)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);

    let req = Request::get("/api/credits").header("x-user-id", "frank").body(Body::empty()).unwrap();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"]["balance"], 5);
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_bad_ticker_rejected() {
    let app = app(MockQuotes::with_prices(&[])).await;
    let (status, _) = call(&app, get("/api/stocks/%20%20")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_input_gets_json_error() {
    let app = app(MockQuotes::with_prices(&[("AAPL", 100.0)])).await;
    call(&app, user_post("/api/challenge/enroll", "gina", json!({}))).await;

    let (status, body) = call(&app, user_post("/api/challenge/trade", "gina", json!({"ticker": "AAPL"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("side"));

    let req = Request::post("/api/scenario")
        .header("x-user-id", "gina")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(&app, get("/api/picks?limit=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_reports_model_usage() {
    let app = app(MockQuotes::with_prices(&[("NVDA", 120.0)])).await;
    call(&app, cron_post("/api/picks/generate", json!({}))).await;

    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let usage = &body["usage"][0];
    assert_eq!(usage["id"], "oracle-1");
    assert_eq!(usage["calls"], 1);
    assert!((usage["cost_usd"].as_f64().unwrap() - 0.001).abs() < 1e-9);
}
