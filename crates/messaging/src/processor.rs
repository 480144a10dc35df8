//! Processor driving readers through a handler into a writer.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{MessagingError, Result};
use crate::handler::Handler;
use crate::reader::Reader;
use crate::writer::Writer;

enum ProcessorState<M> {
    Idle(Vec<Reader<M>>),
    Running {
        token: CancellationToken,
        workers: Vec<JoinHandle<Reader<M>>>,
    },
    Closed,
}

/// Runs one worker task per managed reader.
///
/// Each worker loops read → handle → write. Handler and write failures are
/// logged and the loop moves on to the next message; nothing is retried.
pub struct Processor<H: Handler> {
    name: &'static str,
    handler: Arc<H>,
    writer: Option<Arc<Writer>>,
    state: Mutex<ProcessorState<H::Message>>,
}

impl<H: Handler> Processor<H> {
    /// Creates an idle processor. `writer` is `None` for handlers whose
    /// replies are never published.
    pub fn new(
        name: &'static str,
        handler: H,
        readers: Vec<Reader<H::Message>>,
        writer: Option<Writer>,
    ) -> Self {
        Self {
            name,
            handler: Arc::new(handler),
            writer: writer.map(Arc::new),
            state: Mutex::new(ProcessorState::Idle(readers)),
        }
    }

    /// Returns the processor name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns `true` while workers are running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ProcessorState::Running { .. })
    }

    /// Starts every reader and spawns one worker per reader.
    #[tracing::instrument(skip(self), fields(processor = self.name))]
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let readers = match std::mem::replace(&mut *state, ProcessorState::Closed) {
            ProcessorState::Idle(readers) => readers,
            running @ ProcessorState::Running { .. } => {
                *state = running;
                return Err(MessagingError::AlreadyStarted);
            }
            ProcessorState::Closed => return Err(MessagingError::Closed),
        };

        let token = CancellationToken::new();
        let mut workers = Vec::with_capacity(readers.len());
        for mut reader in readers {
            if let Err(err) = reader.start(&token) {
                tracing::warn!(topic = %reader.source(), error = %err, "reader already running");
            }
            workers.push(tokio::spawn(run_worker(
                self.name,
                reader,
                Arc::clone(&self.handler),
                self.writer.clone(),
                token.clone(),
            )));
        }

        tracing::info!(workers = workers.len(), "processor started");
        *state = ProcessorState::Running { token, workers };
        Ok(())
    }

    /// Cancels every worker, waits for all of them and stops the readers.
    ///
    /// The processor returns to idle and can be started again.
    #[tracing::instrument(skip(self), fields(processor = self.name))]
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        stop_workers(&mut state).await
    }

    /// Stops the processor if it is running, then closes the reader broker
    /// connections and the writer.
    #[tracing::instrument(skip(self), fields(processor = self.name))]
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if matches!(*state, ProcessorState::Running { .. }) {
            stop_workers(&mut state).await?;
        }

        let readers = match std::mem::replace(&mut *state, ProcessorState::Closed) {
            ProcessorState::Idle(readers) => readers,
            ProcessorState::Running { .. } | ProcessorState::Closed => {
                return Err(MessagingError::Closed);
            }
        };

        let mut first_error = None;
        for mut reader in readers {
            if let Err(err) = reader.close().await {
                tracing::warn!(topic = %reader.source(), error = %err, "failed to close reader");
                first_error.get_or_insert(err);
            }
        }
        if let Some(writer) = &self.writer {
            if let Err(err) = writer.close().await {
                tracing::warn!(topic = %writer.topic(), error = %err, "failed to close writer");
                first_error.get_or_insert(err);
            }
        }

        tracing::info!("processor closed");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn stop_workers<M>(state: &mut ProcessorState<M>) -> Result<()> {
    let (token, workers) = match std::mem::replace(state, ProcessorState::Closed) {
        ProcessorState::Running { token, workers } => (token, workers),
        idle @ ProcessorState::Idle(_) => {
            *state = idle;
            return Err(MessagingError::NotStarted);
        }
        ProcessorState::Closed => return Err(MessagingError::Closed),
    };

    token.cancel();

    let mut readers = Vec::with_capacity(workers.len());
    for worker in workers {
        match worker.await {
            Ok(reader) => readers.push(reader),
            Err(err) => tracing::error!(error = %err, "processor worker panicked"),
        }
    }

    tracing::info!("processor stopped");
    *state = ProcessorState::Idle(readers);
    Ok(())
}

async fn run_worker<H: Handler>(
    name: &'static str,
    mut reader: Reader<H::Message>,
    handler: Arc<H>,
    writer: Option<Arc<Writer>>,
    token: CancellationToken,
) -> Reader<H::Message> {
    let topic = reader.source().as_str();

    loop {
        let envelope = match reader.read(&token).await {
            Ok(envelope) => envelope,
            Err(MessagingError::Cancelled) => break,
            Err(err @ (MessagingError::ReaderStopped | MessagingError::NotStarted)) => {
                tracing::error!(processor = name, topic, error = %err, "reader unavailable, worker exiting");
                break;
            }
            Err(err) => {
                tracing::warn!(processor = name, topic, error = %err, "failed to read message");
                continue;
            }
        };

        let message_id = envelope.id;
        let message_name = envelope.name();

        let output = match handler.handle(envelope).await {
            Ok(output) => {
                metrics::counter!("pipeline_messages_handled_total", "processor" => name, "name" => message_name)
                    .increment(1);
                output
            }
            Err(err) => {
                metrics::counter!("pipeline_handler_errors_total", "processor" => name, "name" => message_name)
                    .increment(1);
                tracing::error!(
                    processor = name,
                    %message_id,
                    name = message_name,
                    error = %err,
                    "handler failed"
                );
                continue;
            }
        };

        match (&writer, output.as_ref()) {
            (Some(writer), output) => {
                if let Err(err) = writer.write(output).await {
                    metrics::counter!("pipeline_write_errors_total", "processor" => name)
                        .increment(1);
                    tracing::error!(
                        processor = name,
                        %message_id,
                        topic = %writer.topic(),
                        error = %err,
                        "failed to publish result"
                    );
                }
            }
            (None, Some(result)) => {
                tracing::warn!(
                    processor = name,
                    %message_id,
                    result = result.name(),
                    "no writer configured, dropping result"
                );
            }
            (None, None) => {}
        }
    }

    if let Err(err) = reader.stop().await {
        tracing::debug!(processor = name, topic, error = %err, "reader was not running");
    }
    reader
}
