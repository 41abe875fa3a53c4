//! Delivery progression rules.
//!
//! Forward only along queued → downloading → downloaded → displayed, steps
//! may be skipped (a device can report `displayed` straight from `queued`).
//! `failed` is reachable from any non-terminal status. `displayed` and
//! `failed` are terminal; a failed delivery is retried as a new record.

use super::models::DeliveryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStep {
    Advance,
    /// Re-report of the current status.
    Unchanged,
    Refused,
}

pub fn check(current: DeliveryStatus, requested: DeliveryStatus) -> DeliveryStep {
    if current == requested {
        return DeliveryStep::Unchanged;
    }
    if current.is_terminal() {
        return DeliveryStep::Refused;
    }
    match (current.progress(), requested.progress()) {
        (_, None) => DeliveryStep::Advance,
        (Some(from), Some(to)) if to > from => DeliveryStep::Advance,
        _ => DeliveryStep::Refused,
    }
}
