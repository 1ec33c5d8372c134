pub mod coordinator;
pub mod failure;
pub mod interface;
pub mod prompt;
pub mod retry;
pub mod stats;
pub mod upstream;

pub use coordinator::TranslationCoordinator;
pub use interface::*;
pub use prompt::PromptBuilder;
pub use retry::{RetryOrchestrator, RetryPolicy, TokioSleeper};
pub use stats::StatsAggregator;
pub use upstream::OpenRouterClient;
