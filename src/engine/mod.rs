//! Pick competition engine: weekly generation, outcome tracking,
//! leaderboard aggregation, calibration and what-if scenarios.

pub mod calibration;
pub mod generator;
pub mod leaderboard;
pub mod scenario;
pub mod tracker;

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::llm::TextGenerator;

/// A configured competitor with a live client.
#[derive(Clone)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub client: Arc<dyn TextGenerator>,
}

impl ModelEntry {
    pub fn new(config: &ModelConfig, client: Arc<dyn TextGenerator>) -> Self {
        Self {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            provider: config.provider.clone(),
            client,
        }
    }
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.client.model_name())
            .finish()
    }
}
