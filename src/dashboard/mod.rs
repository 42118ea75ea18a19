//! Dashboard: Axum web server for the JSON API.
//!
//! Serves the REST API and a small self-contained status page.
//! CORS is open so a separately hosted front end can call the API.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use routes::AppState;

/// The embedded status page (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Bind `port` and serve until `shutdown` resolves.
pub async fn serve(state: AppState, port: u16, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(routes::USER_ID_HEADER),
        ]);

    Router::new()
        // Cron
        .route("/api/picks/generate", get(routes::manual_generate).post(routes::cron_generate))
        .route("/api/outcomes", post(routes::process_outcomes))
        .route("/api/leaderboard/recompute", post(routes::recompute_leaderboard))
        // Public reads
        .route("/api/picks", get(routes::get_picks))
        .route("/api/competition", get(routes::get_competition))
        .route("/api/leaderboard", get(routes::get_leaderboard))
        .route("/api/calibration", get(routes::get_calibration))
        .route("/api/economy", get(routes::get_economy))
        .route("/api/crypto", get(routes::get_crypto))
        .route("/api/stocks/:ticker", get(routes::get_stock))
        .route("/api/challenge/leaderboard", get(routes::get_challenge_leaderboard))
        // User-scoped
        .route("/api/challenge", get(routes::get_challenge))
        .route("/api/challenge/enroll", post(routes::enroll))
        .route("/api/challenge/trade", post(routes::trade))
        .route("/api/challenge/milestones", post(routes::check_milestones))
        .route("/api/challenge/complete", post(routes::complete))
        .route("/api/challenge/abandon", post(routes::abandon))
        .route("/api/credits", get(routes::get_credits))
        .route("/api/scenario", post(routes::simulate_scenario))
        .route("/health", get(routes::health))
        // Status page
        .route("/", get(serve_dashboard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the embedded HTML page.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
