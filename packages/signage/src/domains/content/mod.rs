//! Content domain - uploaded assets and their status
//!
//! `ContentStore` is the only writer of content status. Every change is
//! validated against `machines::is_allowed`, serialized per item, recorded
//! in the item's history and announced on the bus.

pub mod events;
pub mod machines;
pub mod models;
pub mod reaper;
pub mod store;

pub use events::ContentEvent;
pub use models::{ContentItem, ContentStatus, NewContent, TransitionCause};
pub use reaper::UploadReaper;
pub use store::ContentStore;
