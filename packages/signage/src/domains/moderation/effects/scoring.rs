//! Bounded scorer invocation: per-call timeout, exponential backoff between
//! attempts, fixed retry budget. A scorer panic spends an attempt the same
//! way an error does.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::worker::panic_message;
use crate::kernel::{BaseContentScorer, ContentScore, ScoreRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRetryPolicy {
    pub timeout: Duration,
    /// Retries after the first attempt. Total calls = max_retries + 1.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ScoringRetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based), doubling from the
    /// initial backoff and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Longest a full run of attempts can take: every call timing out plus
    /// every backoff between them.
    pub fn budget(&self) -> Duration {
        let calls = self.timeout.saturating_mul(self.max_attempts());
        (1..self.max_attempts())
            .map(|retry| self.backoff(retry))
            .fold(calls, Duration::saturating_add)
    }
}

impl Default for ScoringRetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

#[derive(Debug)]
pub struct Scored {
    pub score: ContentScore,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct ScoringExhausted {
    pub attempts: u32,
    pub last_error: String,
}

/// Call the scorer until it answers or the budget runs out. Cancellation
/// ends the loop early and counts as exhaustion.
pub async fn score_with_retries(
    scorer: &dyn BaseContentScorer,
    request: &ScoreRequest,
    policy: &ScoringRetryPolicy,
    shutdown: &CancellationToken,
) -> Result<Scored, ScoringExhausted> {
    let max_attempts = policy.max_attempts();
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.backoff(attempt - 1);
            debug!(content_id = %request.content_id, attempt, ?delay, "backing off before scoring retry");
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Err(ScoringExhausted {
                        attempts: attempt - 1,
                        last_error: format!("shutdown during backoff ({})", last_error),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let call = AssertUnwindSafe(scorer.score(request)).catch_unwind();
        match tokio::time::timeout(policy.timeout, call).await {
            Ok(Ok(Ok(score))) => {
                return Ok(Scored {
                    score,
                    attempts: attempt,
                })
            }
            Ok(Ok(Err(e))) => last_error = format!("{:#}", e),
            Ok(Err(panic)) => last_error = format!("scorer panicked: {}", panic_message(&panic)),
            Err(_) => last_error = format!("timed out after {:?}", policy.timeout),
        }

        warn!(
            content_id = %request.content_id,
            attempt,
            max_attempts,
            error = %last_error,
            "scoring attempt failed"
        );
    }

    Err(ScoringExhausted {
        attempts: max_attempts,
        last_error,
    })
}
