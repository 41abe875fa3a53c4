pub mod content;
pub mod distribution;
pub mod moderation;
pub mod notifications;
