use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::interface::{TranslationRequest, TranslationResult};
use super::prompt::PromptBuilder;
use super::retry::{RetryOrchestrator, RetryOutcome};
use super::stats::StatsAggregator;

/// Per-request façade over prompt building, retries and stats
pub struct TranslationCoordinator {
    prompts: PromptBuilder,
    orchestrator: RetryOrchestrator,
    stats: Arc<StatsAggregator>,
}

impl TranslationCoordinator {
    pub fn new(
        prompts: PromptBuilder,
        orchestrator: RetryOrchestrator,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            prompts,
            orchestrator,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Translate, or echo the original text once retries are exhausted.
    /// Never fails.
    pub async fn translate(&self, request: TranslationRequest) -> TranslationResult {
        let span = info_span!(
            "translate",
            request_id = %Uuid::new_v4(),
            chat_id = %request.chat_id,
            direction = ?request.direction
        );
        self.translate_inner(request).instrument(span).await
    }

    async fn translate_inner(&self, request: TranslationRequest) -> TranslationResult {
        let start = Instant::now();
        let messages = self
            .prompts
            .build(&request.text, request.direction, &request.context);

        let outcome = self.orchestrator.run(&messages).await;
        let elapsed = start.elapsed();
        let retries = outcome.retries();
        let attempts = outcome.attempts();

        let result = match outcome {
            RetryOutcome::Success { text, .. } => TranslationResult {
                translated_text: text,
                original_text: request.text.clone(),
                direction: request.direction,
                translation_failed: false,
            },
            RetryOutcome::Exhausted { last_failure, .. } => {
                error!(
                    "All retries exhausted for chat_id={} direction={:?} text_len={} attempts={}. \
                     Last error: {}",
                    request.chat_id,
                    request.direction,
                    request.text.len(),
                    attempts,
                    last_failure
                );
                self.stats.record_fallback();
                TranslationResult::echo(&request, true)
            }
        };

        self.stats
            .record_attempt(!result.translation_failed, retries, elapsed);

        info!(
            "chat_id={} direction={:?} text_len={} response_time_ms={:.0} attempts={} failed={}",
            request.chat_id,
            request.direction,
            request.text.len(),
            elapsed.as_secs_f64() * 1000.0,
            attempts,
            result.translation_failed
        );

        result
    }
}
