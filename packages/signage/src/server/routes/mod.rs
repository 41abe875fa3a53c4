// HTTP routes
pub mod content;
pub mod distribution;
pub mod health;
pub mod review;
pub mod stream;

pub use content::*;
pub use distribution::*;
pub use health::*;
pub use review::*;
pub use stream::*;
