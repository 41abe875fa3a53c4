//! Random scorer for local runs and demos.
//!
//! Approves roughly `approval_rate` of items with a confidence at or above
//! the configured auto-approve threshold. The remainder splits evenly
//! between a confidence strictly between the thresholds (human review) and
//! one below auto-reject.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{BaseContentScorer, ContentScore, ModerationAnalysis, ScoreRequest};
use crate::domains::moderation::Thresholds;

pub struct SimulatedScorer {
    approval_rate: f64,
    thresholds: Thresholds,
    latency: Duration,
    rng: Mutex<fastrand::Rng>,
}

impl SimulatedScorer {
    pub fn new(approval_rate: f64, thresholds: Thresholds, latency: Duration) -> Self {
        Self {
            approval_rate: approval_rate.clamp(0.0, 1.0),
            thresholds,
            latency,
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(fastrand::Rng::with_seed(seed));
        self
    }

    fn roll(&self) -> (f64, f64) {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        (rng.f64(), rng.f64())
    }

    /// `spread` is in `[0, 1)`, so each band stays on its side of the
    /// thresholds.
    fn confidence(&self, verdict_roll: f64, spread: f64) -> f64 {
        let Thresholds {
            auto_approve,
            auto_reject,
        } = self.thresholds;
        if verdict_roll < self.approval_rate {
            auto_approve + spread * (1.0 - auto_approve)
        } else if verdict_roll < self.approval_rate + (1.0 - self.approval_rate) / 2.0 {
            auto_reject + (auto_approve - auto_reject) * (0.05 + 0.9 * spread)
        } else {
            auto_reject * spread
        }
    }
}

fn category_for(media_type: &str) -> &str {
    media_type.split('/').next().unwrap_or("unknown")
}

fn analysis_for(
    request: &ScoreRequest,
    confidence: f64,
    thresholds: &Thresholds,
) -> ModerationAnalysis {
    let mut safety_scores = BTreeMap::new();
    safety_scores.insert("adult".to_string(), (confidence + 0.05).min(1.0));
    safety_scores.insert("violence".to_string(), confidence);
    safety_scores.insert("hate".to_string(), (confidence + 0.02).min(1.0));

    let (reasoning, concerns, suggestions) = if confidence >= thresholds.auto_approve {
        (
            "No policy concerns detected.".to_string(),
            Vec::new(),
            Vec::new(),
        )
    } else if confidence > thresholds.auto_reject {
        (
            "Some elements may need a human look.".to_string(),
            vec!["ambiguous imagery".to_string()],
            vec!["confirm brand guidelines are met".to_string()],
        )
    } else {
        (
            "Content likely violates display policy.".to_string(),
            vec!["policy violation".to_string()],
            vec!["replace the flagged asset".to_string()],
        )
    };

    ModerationAnalysis {
        reasoning,
        categories: vec![category_for(&request.media_type).to_string()],
        concerns,
        suggestions,
        safety_scores,
    }
}

#[async_trait]
impl BaseContentScorer for SimulatedScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<ContentScore> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (verdict_roll, spread) = self.roll();
        let confidence = self.confidence(verdict_roll, spread);
        debug!(content_id = %request.content_id, confidence, "simulated score");

        Ok(ContentScore {
            confidence,
            analysis: analysis_for(request, confidence, &self.thresholds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ContentId;
    use crate::domains::moderation::{decide, AutoDecision};

    fn request() -> ScoreRequest {
        ScoreRequest {
            content_id: ContentId::new(),
            media_type: "image/png".to_string(),
            storage_locator: "s3://bucket/key.png".to_string(),
        }
    }

    fn scorer(approval_rate: f64, seed: u64) -> SimulatedScorer {
        SimulatedScorer::new(approval_rate, Thresholds::default(), Duration::ZERO).with_seed(seed)
    }

    #[tokio::test]
    async fn test_confidence_always_in_unit_range() {
        let scorer = scorer(0.7, 7);
        for _ in 0..500 {
            let score = scorer.score(&request()).await.unwrap();
            assert!((0.0..=1.0).contains(&score.confidence));
            assert_eq!(score.analysis.categories, vec!["image".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_full_approval_rate_always_scores_high() {
        let scorer = scorer(1.0, 1);
        for _ in 0..100 {
            assert!(scorer.score(&request()).await.unwrap().confidence >= 0.9);
        }
    }

    #[tokio::test]
    async fn test_zero_approval_rate_never_scores_high() {
        let scorer = scorer(0.0, 2);
        for _ in 0..100 {
            assert!(scorer.score(&request()).await.unwrap().confidence < 0.9);
        }
    }

    #[tokio::test]
    async fn test_approval_rate_is_roughly_honoured() {
        let scorer = scorer(0.7, 42);
        let mut approved = 0;
        for _ in 0..2_000 {
            if scorer.score(&request()).await.unwrap().confidence >= 0.9 {
                approved += 1;
            }
        }
        let rate = approved as f64 / 2_000.0;
        assert!((0.6..0.8).contains(&rate), "rate was {rate}");
    }

    #[tokio::test]
    async fn test_bands_follow_configured_thresholds() {
        let thresholds = Thresholds::new(0.95, 0.1).unwrap();

        let approving = SimulatedScorer::new(1.0, thresholds, Duration::ZERO).with_seed(3);
        for _ in 0..200 {
            let score = approving.score(&request()).await.unwrap();
            assert_eq!(decide(score.confidence, &thresholds), AutoDecision::Approve);
            assert!(score.analysis.concerns.is_empty());
        }

        let declining = SimulatedScorer::new(0.0, thresholds, Duration::ZERO).with_seed(4);
        let (mut escalated, mut rejected) = (0, 0);
        for _ in 0..400 {
            let score = declining.score(&request()).await.unwrap();
            match decide(score.confidence, &thresholds) {
                AutoDecision::Escalate => {
                    escalated += 1;
                    assert!(score.confidence > 0.1 && score.confidence < 0.95);
                }
                AutoDecision::Reject => {
                    rejected += 1;
                    assert!(score.confidence <= 0.1);
                }
                AutoDecision::Approve => panic!("approved at {}", score.confidence),
            }
            assert!(!score.analysis.concerns.is_empty());
        }
        assert!(escalated > 100 && rejected > 100, "{escalated}/{rejected}");
    }
}
