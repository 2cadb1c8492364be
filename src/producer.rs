//! Instrumented publishing of a single outbox entry.
//!
//! [`OutboxProducer`] performs one publish attempt:
//!
//! - Probes the entry payload for metadata ([`Envelope`])
//! - Resolves the span display name through the naming registry
//! - Opens a producer span as a child of the caller's trace context
//! - Injects the span's trace context into a copy of the payload
//! - Delegates delivery to the transport
//! - Closes the span on every exit path
//!
//! Metadata enrichment is best-effort: an unparseable or non-object
//! payload reduces the tracing detail but never blocks the publish. A broker failure is surfaced to the caller only after the
//! span has been marked failed and ended. This layer never retries;
//! retry policy belongs to the caller or the broker client.

use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry::trace::{Status, TraceContextExt};
use serde_json::Value;
use tower::Service;
use tracing_error::SpanTrace;

use crate::diagnostics::{Diagnostics, FlowKind, JsonFieldCarrier, MessagingOperation};
use crate::envelope::Envelope;
use crate::outbox::OutboxEntry;
use crate::transport::{BrokerRecord, Transport, TransportError};

/// Publishes outbox entries to the broker, one instrumented attempt per
/// call.
///
/// Cloneable: each worker clones the producer and publishes
/// independently; the [`Diagnostics`] configuration is shared.
#[derive(Clone)]
pub struct OutboxProducer<T> {
    transport: Transport<T>,
    diagnostics: Arc<Diagnostics>,
}

impl<T> OutboxProducer<T>
where
    T: Service<BrokerRecord> + Clone + Send + 'static,
    T::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    /// Create a producer with default instrumentation.
    pub fn new(transport: Transport<T>) -> Self {
        Self::with_diagnostics(transport, Arc::new(Diagnostics::new()))
    }

    /// Create a producer with an explicitly configured [`Diagnostics`].
    pub fn with_diagnostics(transport: Transport<T>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            transport,
            diagnostics,
        }
    }

    /// The instrumentation configuration this producer publishes with.
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Publish one entry, parented to the ambient trace context.
    ///
    /// Captures [`Context::current`] once at call entry; see
    /// [`produce_with_parent`](Self::produce_with_parent) for the
    /// explicit form.
    pub async fn produce(&mut self, entry: &OutboxEntry) -> Result<(), ProduceError> {
        let parent = Context::current();
        self.produce_with_parent(entry, &parent).await
    }

    /// Publish one entry as a child of an explicit trace context.
    ///
    /// If `parent` carries no valid span context, the publish span roots
    /// a new trace. Exactly one span is started and ended per call,
    /// whatever the outcome; if the send is cancelled mid-flight the
    /// span still ends when the context is dropped.
    #[tracing::instrument(skip_all, fields(message_id = %entry.message_id, topic = %entry.topic))]
    pub async fn produce_with_parent(
        &mut self,
        entry: &OutboxEntry,
        parent: &Context,
    ) -> Result<(), ProduceError> {
        let fields = match serde_json::from_str::<Value>(&entry.payload) {
            Ok(Value::Object(fields)) => Some(fields),
            _ => None,
        };
        let envelope = fields
            .as_ref()
            .map(Envelope::from_object)
            .unwrap_or_default();
        let message_type = envelope.message_type().unwrap_or_default();

        let name = self.diagnostics.activity_name(
            FlowKind::OutboxPublishing,
            &entry.topic,
            message_type,
            MessagingOperation::Publish,
        );
        let cx = self.diagnostics.start_publishing_span(parent, name, entry);

        // Non-object payloads cannot carry trace fields; they go out
        // unmodified and only the span itself carries trace data.
        let value = match fields {
            Some(mut fields) => {
                self.diagnostics
                    .inject_context(&cx, &mut JsonFieldCarrier(&mut fields));
                Value::Object(fields).to_string()
            }
            None => entry.payload.clone(),
        };

        let record = BrokerRecord {
            topic: entry.topic.clone(),
            key: entry.key.clone(),
            value,
        };

        match self.transport.send(record).await {
            Ok(()) => {
                let span = cx.span();
                span.set_status(Status::Ok);
                span.end();
                Ok(())
            }
            Err(err) => {
                let span = cx.span();
                span.set_status(Status::error(err.to_string()));
                span.end();
                Err(ProduceError::transport(err))
            }
        }
    }
}

/// Error returned when one publish attempt fails.
///
/// The publish span is already closed and marked failed by the time this
/// error reaches the caller.
#[derive(Debug)]
pub struct ProduceError {
    context: SpanTrace,
    source: TransportError,
}

impl ProduceError {
    fn transport(source: TransportError) -> Self {
        Self {
            context: SpanTrace::capture(),
            source,
        }
    }
}

impl std::fmt::Display for ProduceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Publish failed: {}", self.source)?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ProduceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
