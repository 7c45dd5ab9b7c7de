// HTTP routes
pub mod health;
pub mod telegram;
pub mod timer;

pub use health::*;
pub use telegram::*;
pub use timer::*;
