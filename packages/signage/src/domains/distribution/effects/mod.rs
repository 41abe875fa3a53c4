pub mod auto_distribute;

pub use auto_distribute::{ApprovalSweeper, AutoDistributor};
