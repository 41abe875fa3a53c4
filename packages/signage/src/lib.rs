// Signage Pipeline - Core
//
// Event-driven moderation and distribution for digital-signage content:
// uploads are scored and settled (automatically or by a reviewer), and
// approved content is delivered to devices with per-delivery tracking.
//
// Domains live in domains/*; infrastructure seams in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod error;
pub mod events;
pub mod kernel;
pub mod pipeline;
pub mod server;

pub use config::*;
pub use error::{PipelineError, PreconditionViolation};
pub use pipeline::{Pipeline, PipelineContext, PipelineHandle};
