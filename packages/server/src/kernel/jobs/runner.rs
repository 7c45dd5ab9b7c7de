//! Timer runner service for delivering due timers.
//!
//! The `TimerRunner` is a background service that:
//! - Polls the timer queue for due timers
//! - Hands each one to the timer-fired entry point
//! - Marks it fired
//!
//! ```text
//! TimerRunner
//!     │
//!     ├─► Poll DB (claim due timers via TimerQueue)
//!     ├─► TimerFiredHandler::on_timer_fired(chat_id)
//!     └─► Mark fired
//! ```
//!
//! Delivery is at-least-once: a runner that crashes between the handler and
//! `mark_fired` leaves the claim to expire and the timer is delivered again. The
//! session machine ignores timer events outside WORKING, so repeats are harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::queue::TimerQueue;
use crate::common::ChatId;

/// Receiver of elapsed timers.
#[async_trait]
pub trait TimerFiredHandler: Send + Sync {
    async fn on_timer_fired(&self, chat_id: ChatId);
}

/// Configuration for the timer runner.
#[derive(Debug, Clone)]
pub struct TimerRunnerConfig {
    /// Maximum number of timers to claim at once
    pub batch_size: i64,
    /// How long to wait when nothing is due
    pub poll_interval: Duration,
    pub worker_id: String,
}

impl Default for TimerRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("timer-runner-{}", Uuid::new_v4()),
        }
    }
}

impl TimerRunnerConfig {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }
}

pub struct TimerRunner {
    queue: Arc<dyn TimerQueue>,
    handler: Arc<dyn TimerFiredHandler>,
    config: TimerRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl TimerRunner {
    pub fn new(
        queue: Arc<dyn TimerQueue>,
        handler: Arc<dyn TimerFiredHandler>,
        config: TimerRunnerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Call `store(true, Ordering::SeqCst)` on the returned Arc to stop the loop.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Claim and deliver one batch. Returns how many timers were delivered.
    pub async fn tick(&self) -> Result<usize> {
        let timers = self
            .queue
            .claim_due(&self.config.worker_id, self.config.batch_size)
            .await?;

        if !timers.is_empty() {
            debug!(count = timers.len(), "claimed due timers");
        }

        let mut delivered = 0;
        for timer in timers {
            if self.is_shutdown_requested() {
                break;
            }

            debug!(timer_id = %timer.id, chat_id = %timer.chat_id, "delivering timer");
            self.handler.on_timer_fired(timer.chat_id).await;

            if let Err(e) = self.queue.mark_fired(timer.id).await {
                error!(timer_id = %timer.id, error = %e, "failed to mark timer as fired");
            }
            delivered += 1;
        }

        Ok(delivered)
    }

    /// Run until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "timer runner starting"
        );

        while !self.is_shutdown_requested() {
            match self.tick().await {
                Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to claim timers");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "timer runner stopped");
        Ok(())
    }
}
