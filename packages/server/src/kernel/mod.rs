//! Kernel module - server infrastructure and dependencies.

pub mod authorization;
pub mod deps;
pub mod jobs;
pub mod session_store;
pub mod sinks;
pub mod test_dependencies;
pub mod traits;

pub use authorization::AllowlistGate;
pub use deps::{parse_telegram_update, ServerDeps, TelegramAdapter};
pub use jobs::{PostgresTimerQueue, TimerFiredHandler, TimerRunner, TimerRunnerConfig};
pub use session_store::{PostgresSessionStore, Revision, StoreError};
pub use sinks::{NoteFileSink, PostgresIngestionSink};
pub use test_dependencies::TestDependencies;
pub use traits::*;
