//! Content transition rules.
//!
//! Pure: given the current status, the requested status and the cause,
//! decide whether the move is allowed. The store applies the answer.

use super::models::{ContentStatus, TransitionCause};

/// Whether `cause` may move an item from `current` to `requested`.
///
/// The edge must exist, and the cause must be the one that edge belongs to.
/// In particular only a human decision may take an item out of
/// `pending_review`, and automated causes apply only to `quarantined`.
pub fn is_allowed(current: ContentStatus, requested: ContentStatus, cause: &TransitionCause) -> bool {
    use ContentStatus::*;

    if !current.can_transition_to(requested) {
        return false;
    }

    match (current, cause) {
        (Uploaded, TransitionCause::Ingestion) => true,
        (Quarantined, TransitionCause::AutoModeration { .. }) => true,
        (Quarantined, TransitionCause::ScoringUnavailable { .. }) => requested == PendingReview,
        (PendingReview, TransitionCause::HumanDecision { .. }) => true,
        (Approved | Rejected, TransitionCause::Archival { .. }) => true,
        _ => false,
    }
}
