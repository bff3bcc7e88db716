use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::Notification;
use super::error::DeliveryError;
use super::sink::NotificationSink;
use crate::config::NotificationConfig;

/// Retry behaviour for a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts per notification, including the first.
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl From<&NotificationConfig> for DeliveryPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
        }
    }
}

impl DeliveryPolicy {
    /// delay = base_delay_ms * 2^(attempt - 1), saturating at `u64::MAX`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Counters reported when the worker shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Notifications the sink accepted, possibly after retries.
    pub delivered: u64,
    /// Notifications dropped after `max_attempts` failures.
    pub failed: u64,
}

/// Drains the dispatcher channel into a sink.
pub struct DeliveryWorker;

impl DeliveryWorker {
    /// Runs the worker on the tokio runtime until every dispatcher is dropped.
    pub fn spawn<S: NotificationSink>(
        rx: mpsc::Receiver<Notification>,
        sink: S,
        policy: DeliveryPolicy,
    ) -> JoinHandle<DeliveryStats> {
        tokio::spawn(Self::run(rx, sink, policy))
    }

    pub async fn run<S: NotificationSink>(
        mut rx: mpsc::Receiver<Notification>,
        sink: S,
        policy: DeliveryPolicy,
    ) -> DeliveryStats {
        let mut stats = DeliveryStats::default();
        while let Some(notification) = rx.recv().await {
            match Self::deliver_with_retry(&sink, &notification, &policy).await {
                Ok(()) => stats.delivered += 1,
                Err(err) => {
                    stats.failed += 1;
                    warn!(
                        case = %notification.event.case_id,
                        sequence = notification.event.sequence,
                        attempts = policy.max_attempts,
                        error = %err,
                        "giving up on notification"
                    );
                }
            }
        }
        stats
    }

    async fn deliver_with_retry<S: NotificationSink>(
        sink: &S,
        notification: &Notification,
        policy: &DeliveryPolicy,
    ) -> Result<(), DeliveryError> {
        let mut attempt = 1;
        loop {
            match sink.deliver(notification).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < policy.max_attempts => {
                    let delay_ms = match &err {
                        DeliveryError::RateLimited { retry_after_ms } => *retry_after_ms,
                        _ => policy.delay_for_attempt(attempt),
                    };
                    debug!(
                        case = %notification.event.case_id,
                        attempt,
                        max = policy.max_attempts,
                        delay_ms,
                        error = %err,
                        "notification delivery failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
