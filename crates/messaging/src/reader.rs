//! Typed reader over a broker connection.
//!
//! A started reader owns one producer task that receives raw messages,
//! decodes them into the consumer's message set and hands them over through
//! a capacity-1 channel. Receive and decode failures travel on a second
//! capacity-1 channel, so a slow consumer applies backpressure all the way
//! to the broker.
//!
//! Messages already taken from the broker but not yet read when the reader
//! stops are kept and handed out first after the next start.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::{MessageSet, Topic};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerReader;
use crate::envelope::Envelope;
use crate::error::{BrokerError, MessagingError, Result};

/// Reader settings.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Delay before retrying after a failed receive.
    pub error_backoff: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_millis(100),
        }
    }
}

struct Running<M> {
    token: CancellationToken,
    task: JoinHandle<Option<Envelope<M>>>,
    messages: mpsc::Receiver<Envelope<M>>,
    errors: mpsc::Receiver<MessagingError>,
}

/// Decoding reader for one broker connection.
pub struct Reader<M> {
    source: Topic,
    broker: Arc<dyn BrokerReader>,
    config: ReaderConfig,
    running: Option<Running<M>>,
    pending: VecDeque<Envelope<M>>,
}

impl<M: MessageSet> Reader<M> {
    /// Creates a stopped reader. `source` labels logs and metrics.
    pub fn new(source: Topic, broker: Arc<dyn BrokerReader>) -> Self {
        Self::with_config(source, broker, ReaderConfig::default())
    }

    pub fn with_config(source: Topic, broker: Arc<dyn BrokerReader>, config: ReaderConfig) -> Self {
        Self {
            source,
            broker,
            config,
            running: None,
            pending: VecDeque::new(),
        }
    }

    /// Returns the topic this reader consumes.
    pub fn source(&self) -> Topic {
        self.source
    }

    /// Number of messages kept from an earlier run and not yet read.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` while the producer task is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the producer task. Its token is a child of `parent`.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<()> {
        if self.running.is_some() {
            return Err(MessagingError::AlreadyStarted);
        }

        let token = parent.child_token();
        let (message_tx, messages) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);

        let task = tokio::spawn(pump::<M>(
            self.source,
            Arc::clone(&self.broker),
            self.config.error_backoff,
            token.clone(),
            message_tx,
            error_tx,
        ));

        tracing::debug!(topic = %self.source, "reader started");
        self.running = Some(Running {
            token,
            task,
            messages,
            errors,
        });
        Ok(())
    }

    /// Waits for the next decoded message or reported error.
    ///
    /// Returns [`MessagingError::Cancelled`] when `cancel` fires first and
    /// [`MessagingError::ReaderStopped`] once the producer task has exited.
    pub async fn read(&mut self, cancel: &CancellationToken) -> Result<Envelope<M>> {
        let running = self.running.as_mut().ok_or(MessagingError::NotStarted)?;

        if cancel.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }
        if let Some(envelope) = self.pending.pop_front() {
            return Ok(envelope);
        }

        let next = async {
            tokio::select! {
                biased;
                Some(err) = running.errors.recv() => Err(err),
                Some(envelope) = running.messages.recv() => Ok(envelope),
                else => Err(MessagingError::ReaderStopped),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MessagingError::Cancelled),
            result = next => result,
        }
    }

    /// Cancels the producer task and waits for it to exit.
    ///
    /// The channels are dropped only after the task is gone. Messages still
    /// buffered in them, and the one the task was handing over, are kept
    /// for the next run.
    pub async fn stop(&mut self) -> Result<()> {
        let mut running = self.running.take().ok_or(MessagingError::NotStarted)?;
        running.token.cancel();

        let unsent = match running.task.await {
            Ok(unsent) => unsent,
            Err(err) => {
                tracing::error!(topic = %self.source, error = %err, "reader task failed");
                None
            }
        };
        while let Ok(envelope) = running.messages.try_recv() {
            self.pending.push_back(envelope);
        }
        self.pending.extend(unsent);
        drop(running.messages);
        drop(running.errors);

        tracing::debug!(topic = %self.source, pending = self.pending.len(), "reader stopped");
        Ok(())
    }

    /// Stops the reader if it is running and closes the broker connection.
    pub async fn close(&mut self) -> Result<()> {
        if self.running.is_some() {
            self.stop().await?;
        }
        if !self.pending.is_empty() {
            tracing::warn!(
                topic = %self.source,
                dropped = self.pending.len(),
                "closing reader with unread messages"
            );
            self.pending.clear();
        }
        self.broker.close().await?;
        Ok(())
    }
}

async fn pump<M: MessageSet>(
    source: Topic,
    broker: Arc<dyn BrokerReader>,
    error_backoff: Duration,
    token: CancellationToken,
    messages: mpsc::Sender<Envelope<M>>,
    errors: mpsc::Sender<MessagingError>,
) -> Option<Envelope<M>> {
    loop {
        let received = tokio::select! {
            _ = token.cancelled() => break,
            received = broker.read_message() => received,
        };

        match received {
            Ok(bytes) => match Envelope::<M>::decode(&bytes) {
                Ok(envelope) => {
                    // Reserve first so a cancelled hand-over keeps the envelope.
                    let permit = tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!(topic = %source, "reader task exiting");
                            return Some(envelope);
                        }
                        permit = messages.reserve() => permit,
                    };
                    match permit {
                        Ok(permit) => permit.send(envelope),
                        Err(_) => return Some(envelope),
                    }
                }
                Err(err) => {
                    metrics::counter!("pipeline_decode_errors_total", "topic" => source.as_str())
                        .increment(1);
                    if !report(&token, &errors, err).await {
                        break;
                    }
                }
            },
            Err(BrokerError::Closed) => {
                let _ = report(&token, &errors, BrokerError::Closed.into()).await;
                break;
            }
            Err(err) => {
                if !report(&token, &errors, err.into()).await {
                    break;
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(error_backoff) => {}
                }
            }
        }
    }

    tracing::debug!(topic = %source, "reader task exiting");
    None
}

/// Forwards an error to the consumer. Returns `false` when the reader is
/// shutting down.
async fn report(
    token: &CancellationToken,
    errors: &mpsc::Sender<MessagingError>,
    err: MessagingError,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = errors.send(err) => sent.is_ok(),
    }
}
