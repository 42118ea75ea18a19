//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, the cron secret) are referenced by env-var name in
//! the config and resolved at runtime into `SecretString`s.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::challenge::milestones::{default_milestones, MilestoneRule};
use crate::challenge::prizes::PrizeTable;
use crate::types::PickCategory;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub competition: CompetitionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub data_sources: DataSourcesConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Env var holding the shared secret for cron-triggered endpoints.
    #[serde(default = "default_cron_secret_env")]
    pub cron_secret_env: String,
    /// Whether `GET /api/picks/generate` may trigger a run without the secret.
    #[serde(default = "default_true")]
    pub allow_manual_trigger: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cron_secret_env: default_cron_secret_env(),
            allow_manual_trigger: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompetitionConfig {
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: i64,
    #[serde(default = "default_pick_horizon_days")]
    pub pick_horizon_days: i64,
    #[serde(default = "default_picks_per_category")]
    pub picks_per_category: usize,
    #[serde(default = "default_categories")]
    pub categories: Vec<PickCategory>,
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            duration_weeks: default_duration_weeks(),
            pick_horizon_days: default_pick_horizon_days(),
            picks_per_category: default_picks_per_category(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_generation_interval")]
    pub generation_interval_secs: u64,
    #[serde(default = "default_outcome_interval")]
    pub outcome_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            generation_interval_secs: default_generation_interval(),
            outcome_interval_secs: default_outcome_interval(),
        }
    }
}

/// One competing text-generation model.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Stable id used as the `ai_models` primary key.
    pub id: String,
    pub display_name: String,
    /// "openai" | "anthropic" | "gemini" | "groq" | "perplexity" | "openrouter"
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Overrides the provider's default endpoint (OpenAI-compatible kinds only).
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSourcesConfig {
    #[serde(default = "default_finnhub_env")]
    pub finnhub_key_env: String,
    #[serde(default = "default_alpha_vantage_env")]
    pub alpha_vantage_key_env: String,
    #[serde(default = "default_fred_env")]
    pub fred_api_key_env: String,
    #[serde(default = "default_true")]
    pub coingecko_enabled: bool,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            finnhub_key_env: default_finnhub_env(),
            alpha_vantage_key_env: default_alpha_vantage_env(),
            fred_api_key_env: default_fred_env(),
            coingecko_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChallengeConfig {
    #[serde(default = "default_challenge_id")]
    pub id: String,
    #[serde(default = "default_challenge_days")]
    pub duration_days: i64,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
    /// Credits granted the first time a user touches the ledger.
    #[serde(default = "default_starting_credits")]
    pub starting_credits: i64,
    /// Credits charged per what-if scenario simulation.
    #[serde(default = "default_scenario_cost")]
    pub scenario_cost: i64,
    #[serde(default = "default_milestones")]
    pub milestones: Vec<MilestoneRule>,
    #[serde(default)]
    pub prizes: PrizeTable,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            id: default_challenge_id(),
            duration_days: default_challenge_days(),
            starting_balance: default_starting_balance(),
            starting_credits: default_starting_credits(),
            scenario_cost: default_scenario_cost(),
            milestones: default_milestones(),
            prizes: PrizeTable::default(),
        }
    }
}

fn default_port() -> u16 { 3000 }
fn default_cron_secret_env() -> String { "CRON_SECRET".into() }
fn default_true() -> bool { true }
fn default_database_url() -> String { "sqlite://market_oracle.db".into() }
fn default_max_connections() -> u32 { 5 }
fn default_duration_weeks() -> i64 { 12 }
fn default_pick_horizon_days() -> i64 { 7 }
fn default_picks_per_category() -> usize { 3 }
fn default_categories() -> Vec<PickCategory> { PickCategory::ALL.to_vec() }
fn default_generation_interval() -> u64 { 7 * 24 * 3600 }
fn default_outcome_interval() -> u64 { 3600 }
fn default_finnhub_env() -> String { "FINNHUB_API_KEY".into() }
fn default_alpha_vantage_env() -> String { "ALPHA_VANTAGE_API_KEY".into() }
fn default_fred_env() -> String { "FRED_API_KEY".into() }
fn default_challenge_id() -> String { "90-day-challenge".into() }
fn default_challenge_days() -> i64 { 90 }
fn default_starting_balance() -> f64 { 100_000.0 }
fn default_starting_credits() -> i64 { 100 }
fn default_scenario_cost() -> i64 { 10 }

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to a secret, if set and non-empty.
    pub fn resolve_secret(env_name: &str) -> Option<SecretString> {
        std::env::var(env_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }
}
