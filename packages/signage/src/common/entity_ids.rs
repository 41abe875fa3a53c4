//! Typed ids for every entity the pipeline touches.

pub use super::id::Id;

/// Marker for uploaded content items.
pub struct Content;

/// Marker for physical display devices (issued by the device registry).
pub struct Device;

/// Marker for per-device delivery records.
pub struct Delivery;

/// Marker for content owners (advertisers).
pub struct Owner;

/// Marker for human reviewers.
pub struct Reviewer;

pub type ContentId = Id<Content>;

pub type DeviceId = Id<Device>;

pub type DeliveryId = Id<Delivery>;

pub type OwnerId = Id<Owner>;

pub type ReviewerId = Id<Reviewer>;
