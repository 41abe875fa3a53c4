pub mod review_desk;

pub use review_desk::ReviewDesk;
