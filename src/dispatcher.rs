//! Relay loop driving outbox entries through the producer.
//!
//! This module implements the *outbox dispatcher* that:
//!
//! - Streams pending entries from an outbox store
//! - Publishes each through an [`OutboxProducer`]
//! - Marks successfully published entries as processed
//! - Exposes lifecycle hooks for observability and customization
//!
//! The dispatcher runs until:
//! - The entry stream ends
//! - A publish fails
//! - A [`CancellationToken`] is triggered
//!
//! A failed publish leaves its entry unacknowledged, so the store will
//! offer it again under whatever retry policy it implements.

use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::outbox::{MarkProcessed, OutboxEntry, StreamEntries};
use crate::producer::{OutboxProducer, ProduceError};
use crate::transport::BrokerRecord;

/// Outbox dispatcher.
///
/// The `Dispatcher` continuously pulls entries from an outbox store and
/// publishes them through the producer. On successful delivery, entries
/// are marked processed in the store.
///
/// Generic parameters:
/// - `D`: Outbox store implementation
/// - `HK`: Hook implementation for lifecycle events
/// - `T`: Transport service type
pub struct Dispatcher<D, HK, T> {
    outbox: D,
    producer: OutboxProducer<T>,
    hook: HK,
}

impl<D, T> Dispatcher<D, DefaultDispatcherHook, T>
where
    D: StreamEntries + MarkProcessed + Send,
    T: Service<BrokerRecord>,
{
    /// Create a new dispatcher with the default hook implementation.
    pub fn new(outbox: D, producer: OutboxProducer<T>) -> Self {
        Self {
            outbox,
            producer,
            hook: DefaultDispatcherHook,
        }
    }
}

impl<D, HK, T> Dispatcher<D, HK, T>
where
    D: StreamEntries + MarkProcessed + Send,
    <D as StreamEntries>::Error: Into<tower::BoxError>,
    <D as MarkProcessed>::Error: Into<tower::BoxError>,
    D: MarkProcessed<ID = <D as StreamEntries>::ID>,
    HK: DispatcherHook,
    T: Service<BrokerRecord> + Clone + Send + 'static,
    T::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    /// Replace the dispatcher hook while keeping all other generics
    /// unchanged.
    ///
    /// This allows customizing behavior (logging, metrics, etc.) without
    /// rebuilding the dispatcher.
    pub fn with_hook<HK2: DispatcherHook>(self, hook: HK2) -> Dispatcher<D, HK2, T> {
        Dispatcher {
            outbox: self.outbox,
            producer: self.producer,
            hook,
        }
    }

    /// Run the relay loop.
    ///
    /// The dispatcher:
    /// - Subscribes to the outbox entry stream
    /// - Publishes each entry through the producer
    /// - Marks entries processed after successful delivery
    /// - Stops on cancellation, stream end, or publish failure
    ///
    /// The loop can be terminated gracefully using the provided
    /// [`CancellationToken`].
    #[tracing::instrument(skip(self))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), DispatcherRunError> {
        self.hook.on_startup();

        let mut entry_stream = self
            .outbox
            .entries(cancel.clone())
            .await
            .map_err(|e| DispatcherRunError::outbox(e.into()))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.hook.on_shutdown();
                    break;
                }
                stored = entry_stream.next() => {
                    match stored {
                        Some(Ok(stored)) => {
                            self.hook.on_next_entry(&stored.entry);

                            match self.producer.produce(&stored.entry).await {
                                Ok(()) => {
                                    self.hook.on_entry_published(&stored.entry);
                                    if let Err(e) = self.outbox.mark_processed(vec![stored]).await {
                                        self.hook.on_mark_processed_error(e.into().as_ref());
                                    }
                                },
                                Err(e) => {
                                    self.hook.on_produce_error(&e);
                                    return Err(DispatcherRunError::produce(e));
                                }
                            }
                        }
                        Some(Err(err)) => {
                            let err = err.into();
                            self.hook.on_entry_receive_error(err.as_ref());
                            return Err(DispatcherRunError::outbox(err));
                        }
                        None => {
                            self.hook.on_outbox_drained();
                            return Ok(());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Error returned when the dispatcher loop fails.
#[derive(Debug)]
pub struct DispatcherRunError {
    context: tracing_error::SpanTrace,
    kind: DispatcherRunErrorKind,
}

impl DispatcherRunError {
    fn produce(error: ProduceError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: DispatcherRunErrorKind::Produce(error),
        }
    }

    fn outbox(error: tower::BoxError) -> Self {
        DispatcherRunError {
            context: tracing_error::SpanTrace::capture(),
            kind: DispatcherRunErrorKind::Outbox(error),
        }
    }

    /// Classification of the failure.
    pub fn kind(&self) -> &DispatcherRunErrorKind {
        &self.kind
    }
}

/// Classification of dispatcher runtime errors.
#[derive(Debug)]
pub enum DispatcherRunErrorKind {
    /// Errors originating from the outbox store.
    Outbox(tower::BoxError),
    /// Errors originating from a publish attempt.
    Produce(ProduceError),
}

impl std::fmt::Display for DispatcherRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DispatcherRunErrorKind::Outbox(err) => writeln!(f, "Outbox error: {}", err),
            DispatcherRunErrorKind::Produce(err) => writeln!(f, "Produce error: {}", err),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for DispatcherRunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            DispatcherRunErrorKind::Outbox(err) => Some(err.as_ref()),
            DispatcherRunErrorKind::Produce(err) => Some(err),
        }
    }
}

impl From<ProduceError> for DispatcherRunError {
    fn from(err: ProduceError) -> Self {
        DispatcherRunError::produce(err)
    }
}

/// Hook trait for observing dispatcher lifecycle events.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking
/// work. Typical use cases include logging, metrics, and alerting.
pub trait DispatcherHook: Send + Sync {
    fn on_startup(&self);
    fn on_shutdown(&self);
    fn on_next_entry(&self, entry: &OutboxEntry);
    fn on_entry_receive_error(&self, error: &dyn std::error::Error);
    fn on_produce_error(&self, error: &dyn std::error::Error);
    fn on_entry_published(&self, entry: &OutboxEntry);
    fn on_mark_processed_error(&self, error: &dyn std::error::Error);
    fn on_outbox_drained(&self);
}

/// Default dispatcher hook implementation.
///
/// Logs lifecycle events using `tracing`.
pub struct DefaultDispatcherHook;

impl DispatcherHook for DefaultDispatcherHook {
    fn on_startup(&self) {
        tracing::info!("Dispatcher is starting up");
    }

    fn on_shutdown(&self) {
        tracing::info!("Dispatcher is shutting down");
    }

    fn on_next_entry(&self, entry: &OutboxEntry) {
        tracing::debug!(message_id = %entry.message_id, "Entry received");
    }

    fn on_entry_receive_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Error receiving entry");
    }

    fn on_produce_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Error publishing entry");
    }

    fn on_entry_published(&self, entry: &OutboxEntry) {
        tracing::info!(message_id = %entry.message_id, "Entry published successfully");
    }

    fn on_mark_processed_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Failed to mark entry as processed");
    }

    fn on_outbox_drained(&self) {
        tracing::info!("Outbox entry stream ended");
    }
}
