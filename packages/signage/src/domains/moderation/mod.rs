//! Moderation domain - scores uploads and settles their status
//!
//! Flow:
//!   content_uploaded → orchestrator claims (quarantined) → scorer
//!     → thresholds → approved | rejected | pending_review
//!   pending_review → ReviewDesk::decide → approved | rejected
//!
//! The threshold policy in `machines` is pure; the orchestrator and the
//! review desk are the only writers of moderation outcomes.

pub mod actions;
pub mod effects;
pub mod events;
pub mod machines;
pub mod models;

pub use actions::ReviewDesk;
pub use effects::{ModerationOrchestrator, ScoringRetryPolicy};
pub use events::{DecisionSource, ModerationEvent};
pub use machines::{decide, AutoDecision, Thresholds};
