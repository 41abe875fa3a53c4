//! Notifications domain - best-effort fan-out of pipeline events
//!
//! Every bus event becomes a `Notification` (JSON with a `type` field) and
//! goes to each registered `BaseNotificationSink`. Nothing here can fail
//! or slow the pipeline.

pub mod effects;
pub mod models;

pub use effects::{NotificationFanout, StreamHubSink};
pub use models::Notification;
