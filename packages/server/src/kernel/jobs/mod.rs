//! Background timer delivery.

pub mod queue;
pub mod runner;

pub use queue::{ClaimedTimer, PostgresTimerQueue, TimerQueue};
pub use runner::{TimerFiredHandler, TimerRunner, TimerRunnerConfig};
