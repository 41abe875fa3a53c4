pub mod orchestrator;
pub mod scoring;

pub use orchestrator::ModerationOrchestrator;
pub use scoring::{score_with_retries, ScoringRetryPolicy};
