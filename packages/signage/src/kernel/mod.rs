//! Kernel module - pipeline infrastructure and collaborator seams.

pub mod deps;
pub mod device_registry;
pub mod event_bus;
pub mod simulated_scorer;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;
pub mod worker;

pub use deps::PipelineDeps;
pub use device_registry::{DeviceState, InMemoryDeviceRegistry};
pub use event_bus::{EventBus, EventEnvelope, OverflowPolicy, PublishError, Subscription};
pub use simulated_scorer::SimulatedScorer;
pub use stream_hub::StreamHub;
pub use traits::*;
pub use worker::{EventHandler, KeyedWorkerPool, Service};
