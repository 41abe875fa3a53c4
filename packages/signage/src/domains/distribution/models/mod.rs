pub mod distribution_record;
pub mod stats;

pub use distribution_record::*;
pub use stats::*;
