//! Distribution domain - delivery of approved content to devices
//!
//! Flow:
//!   distribute / content_approved (auto) → queued records
//!   approval sweep → queued records for approvals whose event was lost
//!   device reports → downloading → downloaded → displayed | failed
//!   failed → retry_delivery → new queued record
//!
//! `DistributionEngine` is the only writer of delivery records.

pub mod effects;
pub mod engine;
pub mod events;
pub mod machines;
pub mod models;

pub use effects::{ApprovalSweeper, AutoDistributor};
pub use engine::{
    ActivePairPolicy, DeliveryAssignment, DistributionEngine, DistributionOutcome,
    DistributionRequest,
};
pub use events::DistributionEvent;
pub use models::{DeliveryStatus, DistributionRecord, DistributionStats};
