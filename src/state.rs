use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::translate::{
    OpenRouterClient, PromptBuilder, RetryOrchestrator, RetryPolicy, StatsAggregator, TokioSleeper,
    TranslationCoordinator,
};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TranslationCoordinator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let backend = Arc::new(OpenRouterClient::new(&config.upstream_config)?);
        let orchestrator =
            RetryOrchestrator::new(backend, Arc::new(TokioSleeper), RetryPolicy::default());
        let prompts = PromptBuilder::new(
            &config.system_config.system_prompt_path,
            &config.translation_config,
        );

        Ok(Self::with_coordinator(TranslationCoordinator::new(
            prompts,
            orchestrator,
            Arc::new(StatsAggregator::new()),
        )))
    }

    pub fn with_coordinator(coordinator: TranslationCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            started_at: Instant::now(),
        }
    }
}
