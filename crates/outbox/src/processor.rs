//! Background relay from the outbox to the broker.

use std::sync::Arc;
use std::time::Duration;

use common::Clock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{OutboxError, OutboxRepository, Publisher, Result};

/// Outbox processor settings.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Delay between two polls.
    pub poll_interval: Duration,
    /// Failed publishes after which a message is parked. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages published and deleted.
    pub published: usize,
    /// Messages whose publish failed; they stay for the next poll.
    pub failed: usize,
    /// Parked messages skipped without a publish attempt.
    pub parked: usize,
}

struct Relay {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
}

impl Relay {
    async fn process_pending(&self) -> Result<BatchReport> {
        let messages = self.repository.get_all().await?;
        let mut report = BatchReport::default();

        for message in messages {
            if message.is_parked(self.config.max_attempts) {
                report.parked += 1;
                continue;
            }

            if let Err(err) = self.publisher.publish(&message).await {
                report.failed += 1;
                metrics::counter!("outbox_publish_failures_total").increment(1);
                tracing::error!(
                    message_id = %message.id,
                    name = %message.message_type,
                    attempts = message.attempts + 1,
                    error = %err,
                    "failed to publish outbox message"
                );

                match self.repository.record_failure(message.id).await {
                    Ok(attempts) => {
                        if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                            metrics::counter!("outbox_messages_parked_total").increment(1);
                            tracing::error!(
                                message_id = %message.id,
                                name = %message.message_type,
                                attempts,
                                "outbox message parked after repeated failures"
                            );
                        }
                    }
                    Err(err) => tracing::warn!(
                        message_id = %message.id,
                        error = %err,
                        "failed to record publish failure"
                    ),
                }
                continue;
            }

            report.published += 1;
            metrics::counter!("outbox_messages_published_total").increment(1);

            // Left in place, the message is published again on the next poll.
            if let Err(err) = self.repository.delete(message.id).await {
                tracing::warn!(
                    message_id = %message.id,
                    error = %err,
                    "published outbox message could not be deleted"
                );
            }
        }

        if report != BatchReport::default() {
            tracing::debug!(
                published = report.published,
                failed = report.failed,
                parked = report.parked,
                "outbox batch processed"
            );
        }
        Ok(report)
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            // A batch in flight always completes before cancellation is seen.
            if let Err(err) = self.process_pending().await {
                tracing::error!(error = %err, "outbox poll failed");
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.clock.sleep(self.config.poll_interval) => {}
            }
        }
        tracing::debug!("outbox processor loop exited");
    }
}

/// Polls the outbox and relays pending messages to the broker.
///
/// Each message is deleted only after a successful publish. Publish
/// failures leave it for the next poll, so delivery is at-least-once.
pub struct OutboxProcessor {
    relay: Arc<Relay>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl OutboxProcessor {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            relay: Arc::new(Relay {
                repository,
                publisher,
                clock,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    /// Runs exactly one poll.
    #[tracing::instrument(skip(self))]
    pub async fn process_pending(&self) -> Result<BatchReport> {
        self.relay.process_pending().await
    }

    /// Returns `true` while the background loop is running.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawns the polling loop.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(OutboxError::AlreadyStarted);
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.relay).run(token.clone()));
        *running = Some((token, task));

        tracing::info!(
            poll_interval_ms = self.relay.config.poll_interval.as_millis() as u64,
            max_attempts = ?self.relay.config.max_attempts,
            "outbox processor started"
        );
        Ok(())
    }

    /// Cancels the loop and waits for the in-flight batch to finish.
    pub async fn stop(&self) -> Result<()> {
        let (token, task) = self
            .running
            .lock()
            .await
            .take()
            .ok_or(OutboxError::NotStarted)?;

        token.cancel();
        if let Err(err) = task.await {
            tracing::error!(error = %err, "outbox processor task failed");
        }

        tracing::info!("outbox processor stopped");
        Ok(())
    }
}
