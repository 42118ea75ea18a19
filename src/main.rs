//! Market Oracle: AI stock-pick competition server.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, registers the configured models, then runs the
//! HTTP API alongside the generation/outcome scheduler with graceful
//! shutdown on Ctrl+C.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use market_oracle::config::AppConfig;
use market_oracle::dashboard::{self, routes::AppContext, routes::AppState};
use market_oracle::data::finnhub::FinnhubClient;
use market_oracle::engine::generator::sync_models;
use market_oracle::engine::leaderboard::recompute_all;
use market_oracle::engine::ModelEntry;
use market_oracle::llm::build_generator;
use market_oracle::storage::Store;

const BANNER: &str = r#"
 __  __            _        _      ___                 _
|  \/  | __ _ _ __| | _____| |_   / _ \ _ __ __ _  ___| | ___
| |\/| |/ _` | '__| |/ / _ \ __| | | | | '__/ _` |/ __| |/ _ \
| |  | | (_| | |  |   <  __/ |_  | |_| | | | (_| | (__| |  __/
|_|  |_|\__,_|_|  |_|\_\___|\__|  \___/|_|  \__,_|\___|_|\___|

  Weekly AI stock-pick competition
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("MARKET_ORACLE_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        port = cfg.server.port,
        models = cfg.models.len(),
        scheduler = cfg.scheduler.enabled,
        "Market Oracle starting up"
    );

    // -- Storage ---------------------------------------------------------

    let store = Store::connect(&cfg.database.url, cfg.database.max_connections).await?;
    sync_models(&store, &cfg.models).await?;

    // -- Models ----------------------------------------------------------

    let mut models = Vec::new();
    for model in &cfg.models {
        match build_generator(model, AppConfig::resolve_secret(&model.api_key_env)) {
            Ok(Some(client)) => {
                info!(model = %model.id, provider = %model.provider, "Model enabled");
                models.push(ModelEntry::new(model, client));
            }
            Ok(None) => warn!(model = %model.id, env = %model.api_key_env, "No API key; model skipped"),
            Err(e) => error!(model = %model.id, error = %e, "Model client failed to initialise; skipped"),
        }
    }
    if models.is_empty() {
        warn!("No models enabled; pick generation and scenarios will have nothing to call");
    }

    // -- Services --------------------------------------------------------

    let finnhub = Arc::new(FinnhubClient::new(AppConfig::resolve_secret(&cfg.data_sources.finnhub_key_env))?);
    if !finnhub.is_configured() {
        warn!("Finnhub key not set; quotes unavailable, outcomes and trades will fail");
    }
    let state: AppState = Arc::new(AppContext::new(cfg.clone(), store, models, finnhub)?);

    // -- Run -------------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    if cfg.scheduler.enabled {
        tasks.push(tokio::spawn(generation_loop(
            state.clone(),
            Duration::from_secs(cfg.scheduler.generation_interval_secs.max(60)),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(outcome_loop(
            state.clone(),
            Duration::from_secs(cfg.scheduler.outcome_interval_secs.max(60)),
            shutdown_rx.clone(),
        )));
        info!(
            generation_secs = cfg.scheduler.generation_interval_secs,
            outcome_secs = cfg.scheduler.outcome_interval_secs,
            "Scheduler started"
        );
    }

    let mut server_rx = shutdown_rx.clone();
    let server = tokio::spawn(dashboard::serve(state, cfg.server.port, async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    }));

    info!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Scheduler task panicked");
        }
    }
    match server.await {
        Ok(Err(e)) => error!(error = %e, "Server stopped with error"),
        Err(e) => error!(error = %e, "Server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Market Oracle shut down cleanly.");
    Ok(())
}

/// Weekly pick generation. The first tick fires immediately; re-runs within
/// a week are no-ops.
async fn generation_loop(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match state.generator.run_generation(Utc::now()).await {
                    Ok(report) => info!(
                        week = report.week_number,
                        created = report.picks_created,
                        errors = report.errors.len(),
                        "Scheduled generation finished"
                    ),
                    Err(e) => error!(error = %e, "Scheduled generation failed; continuing"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Outcome tracking followed by a leaderboard recompute.
async fn outcome_loop(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match state.tracker.process_expired(Utc::now()).await {
                    Ok(report) if report.processed > 0 => {
                        if let Err(e) = recompute_all(&state.store).await {
                            error!(error = %e, "Leaderboard recompute failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Scheduled outcome processing failed; continuing"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_oracle=info,tower_http=info"));

    let json_logging = std::env::var("MARKET_ORACLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
