pub mod completed_session;
pub mod session;

pub use completed_session::*;
pub use session::*;
