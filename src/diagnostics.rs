//! Publish instrumentation: span naming, trace propagation, span construction.
//!
//! Span naming and propagation format are deployment-level policy, not
//! per-call data. [`Diagnostics`] bundles that policy into one explicitly
//! constructed object handed to the producer at build time (no hidden
//! global state), while keeping reads cheap enough for one lookup per
//! publish.
//!
//! ## Key components
//!
//! - [`Diagnostics`]: the injectable configuration object
//! - [`naming`]: per-flow-kind span display-name registry
//! - [`propagation`]: default propagator and payload carriers
//!
//! ## Concurrency
//!
//! Registrations and propagator swaps take write locks; every publish
//! takes snapshot reads (cloned `Arc`s), so an in-flight publish observes
//! a consistent configuration for its whole duration even while another
//! thread reconfigures.

pub mod naming;
pub mod propagation;

use std::sync::{Arc, RwLock};

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};

use crate::outbox::OutboxEntry;

pub use naming::{ActivityNameFn, ActivityNameRegistry, FlowKind, MessagingOperation};
pub use propagation::{JsonFieldCarrier, JsonFieldExtractor, default_propagator};

/// Default span-name prefix.
pub const DEFAULT_PREFIX: &str = "Courier";

const TRACER_NAME: &str = "courier";

/// Instrumentation configuration for the relay.
///
/// Constructed once at startup (or per test), shared via `Arc`. The
/// registry and the propagator can be reconfigured at runtime; see the
/// module docs for the snapshot guarantees.
pub struct Diagnostics {
    tracer: BoxedTracer,
    prefix: String,
    naming: ActivityNameRegistry,
    propagator: RwLock<Arc<dyn TextMapPropagator + Send + Sync>>,
}

impl Diagnostics {
    /// Configuration with the global tracer provider, the default
    /// propagator, and default naming.
    pub fn new() -> Self {
        Self {
            tracer: global::tracer(TRACER_NAME),
            prefix: DEFAULT_PREFIX.to_owned(),
            naming: ActivityNameRegistry::default(),
            propagator: RwLock::new(Arc::new(default_propagator())),
        }
    }

    /// Replace the span-name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the tracer, e.g. with one from a test provider.
    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Register a span naming function for a flow kind.
    pub fn register_activity_name<F>(&self, flow: FlowKind, f: F)
    where
        F: Fn(&str, &str, &str, &str) -> String + Send + Sync + 'static,
    {
        self.naming.register(flow, f);
    }

    /// Drop all naming registrations, restoring the built-in pattern.
    pub fn reset_activity_names(&self) {
        self.naming.reset();
    }

    /// Replace the propagator for all subsequent publishes.
    pub fn set_propagator<P>(&self, propagator: P)
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        let mut slot = match self.propagator.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Arc::new(propagator);
    }

    /// Restore defaults: built-in naming and the default propagator.
    pub fn reset(&self) {
        self.reset_activity_names();
        self.set_propagator(default_propagator());
    }

    /// Resolve the span display name for one publish or receive.
    pub fn activity_name(
        &self,
        flow: FlowKind,
        topic: &str,
        message_type: &str,
        operation: MessagingOperation,
    ) -> String {
        self.naming
            .resolve(flow, &self.prefix, topic, message_type, operation.as_str())
    }

    /// Snapshot of the current propagator.
    pub fn propagator(&self) -> Arc<dyn TextMapPropagator + Send + Sync> {
        let slot = match self.propagator.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&slot)
    }

    /// Recover a trace context from a carrier via the current propagator.
    ///
    /// An absent or invalid trace header yields a context whose span
    /// context is invalid: a normal value, not an error.
    pub fn extract_context(&self, carrier: &dyn Extractor) -> Context {
        self.propagator().extract(carrier)
    }

    /// Write a context's trace fields (and baggage) into a carrier via
    /// the current propagator.
    pub fn inject_context(&self, cx: &Context, carrier: &mut dyn Injector) {
        self.propagator().inject_context(cx, carrier);
    }

    /// Start the producer span for one publish attempt.
    ///
    /// The span becomes a child of `parent` (or a new trace root when the
    /// parent carries no valid span context) and is returned attached to
    /// a context, so injection sees the new span and its baggage.
    pub(crate) fn start_publishing_span(
        &self,
        parent: &Context,
        name: String,
        entry: &OutboxEntry,
    ) -> Context {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(SpanKind::Producer)
            .with_attributes([
                KeyValue::new("messaging.operation", "publish"),
                KeyValue::new("messaging.destination.name", entry.topic.clone()),
                KeyValue::new("messaging.message.id", entry.message_id.to_string()),
            ])
            .start_with_context(&self.tracer, parent);

        parent.with_span(span)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn activity_name_uses_the_configured_prefix() {
        let diagnostics = Diagnostics::new().with_prefix("Billing");

        let name = diagnostics.activity_name(
            FlowKind::OutboxPublishing,
            "foo",
            "bar",
            MessagingOperation::Publish,
        );

        assert_eq!(name, "Billing.Outbox.foo.bar.Publish");
    }

    #[test]
    fn reset_reverts_naming_overrides() {
        let diagnostics = Diagnostics::new();
        diagnostics.register_activity_name(FlowKind::OutboxPublishing, |p, t, ty, op| {
            format!("{p}.Custom.{t}.{ty}.{op}")
        });

        diagnostics.reset();

        let name = diagnostics.activity_name(
            FlowKind::OutboxPublishing,
            "foo",
            "bar",
            MessagingOperation::Publish,
        );
        assert_eq!(name, "Courier.Outbox.foo.bar.Publish");
    }

    #[test]
    fn replaced_propagator_is_used_for_injection() {
        let diagnostics = Diagnostics::new();

        let mut inbound = serde_json::Map::<String, Value>::new();
        inbound.insert(
            "traceparent".to_owned(),
            Value::String("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_owned()),
        );
        inbound.insert("baggage".to_owned(), Value::String("team=alpha".to_owned()));
        let cx = diagnostics.extract_context(&JsonFieldExtractor(&inbound));

        // Trace-context only: baggage is no longer part of the format.
        diagnostics.set_propagator(opentelemetry_sdk::propagation::TraceContextPropagator::new());

        let mut outbound = serde_json::Map::<String, Value>::new();
        diagnostics.inject_context(&cx, &mut JsonFieldCarrier(&mut outbound));

        assert!(outbound.contains_key("traceparent"));
        assert!(!outbound.contains_key("baggage"));
    }
}
