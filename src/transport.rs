//! Transport abstractions and broker backends.
//!
//! This module defines a Tower-compatible transport layer used to hand
//! [`BrokerRecord`]s to a message broker (e.g. in-memory, Kafka).
//!
//! The transport is built around Tower's `Service` abstraction, enabling
//! middleware composition (retries, timeouts, buffering) while keeping
//! broker backends interchangeable. The broker's own delivery semantics
//! (partitioning, acknowledgment, transport-level retries) stay behind
//! the backend.
//!
//! ## Key components
//!
//! - [`Transport`]: Public-facing wrapper implementing `tower::Service`
//! - [`SenderService`]: Adapter from a [`Sender`] to a Tower service
//! - [`Sender`]: Trait implemented by concrete broker backends
//! - [`TransportError`]: Unified error type with tracing context

mod inmemory;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use tracing_error::SpanTrace;

pub use inmemory::InMemory;

/// One send to the broker: destination topic, routing key, and the wire
/// payload text.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord {
    pub topic: String,
    pub key: String,
    pub value: String,
}

/// Generic Tower-compatible transport wrapper.
///
/// `Transport` is the entry point for sending records. It wraps an
/// underlying Tower `Service` and:
///
/// - Normalizes errors into [`TransportError`]
/// - Supports Tower middleware via layers
/// - Provides a convenience [`send`](Transport::send) API
///
/// Typically constructed from a concrete [`Sender`] implementation.
#[derive(Clone)]
pub struct Transport<S> {
    service: S,
}

impl<D> Transport<SenderService<D>> {
    /// Create a new transport from a concrete broker backend.
    ///
    /// The sender will be wrapped in a [`SenderService`] to make it
    /// Tower-compatible.
    pub fn new(sender: D) -> Self {
        Self {
            service: SenderService::new(sender),
        }
    }
}

impl<S> Transport<S> {
    /// Apply a Tower layer to the transport.
    ///
    /// This enables composition with middleware such as retries,
    /// timeouts, or buffering.
    pub fn layer<L>(self, layer: L) -> Transport<L::Service>
    where
        L: tower::Layer<S>,
    {
        Transport {
            service: layer.layer(self.service),
        }
    }
}

/// Tower `Service` implementation for `Transport`.
///
/// Delegates readiness and request handling to the inner service while
/// mapping all errors into [`TransportError`].
impl<R, S> Service<R> for Transport<S>
where
    S: Service<R> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<tower::BoxError>,
    R: Send + 'static,
{
    type Response = ();
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| TransportError::sender(e.into()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        let mut service = self.service.clone();

        Box::pin(async move {
            service
                .call(req)
                .await
                .map_err(|e| TransportError::sender(e.into()))?;
            Ok(())
        })
    }
}

impl<S> Transport<S> {
    /// Send a [`BrokerRecord`] through the transport.
    ///
    /// This is a convenience method for users that do not need direct
    /// access to the `tower::Service` API.
    pub async fn send(&mut self, record: BrokerRecord) -> Result<(), TransportError>
    where
        S: Service<BrokerRecord> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<tower::BoxError>,
    {
        let mut service = self.service.clone();
        service
            .call(record)
            .await
            .map_err(|e| TransportError::sender(e.into()))?;
        Ok(())
    }
}

/// Error returned by transport operations.
///
/// Each error captures:
/// - The underlying error kind
/// - A tracing span backtrace for improved diagnostics
#[derive(Debug)]
pub struct TransportError {
    context: SpanTrace,
    kind: TransportErrorKind,
}

/// Transport errors kind.
#[derive(Debug)]
pub enum TransportErrorKind {
    /// Errors originating from the broker backend.
    Sender(tower::BoxError),
    /// Errors raised by middleware transforming the record.
    Layer(tower::BoxError),
}

impl TransportError {
    /// Create a backend-related transport error.
    pub fn sender(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: TransportErrorKind::Sender(err),
        }
    }

    /// Create a middleware-related transport error.
    pub fn layer(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: TransportErrorKind::Layer(err),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TransportErrorKind::Sender(err) => writeln!(f, "Sender error: {err}"),
            TransportErrorKind::Layer(err) => writeln!(f, "Layer error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TransportErrorKind::Sender(err) => Some(err.as_ref()),
            TransportErrorKind::Layer(err) => Some(err.as_ref()),
        }
    }
}

/// Tower service adapter for a [`Sender`] backend.
///
/// This type bridges the [`Sender`] trait with Tower's `Service`
/// abstraction.
#[derive(Clone)]
pub struct SenderService<D> {
    sender: D,
}

impl<D> SenderService<D> {
    /// Create a new sender service from a backend.
    pub fn new(sender: D) -> Self {
        Self { sender }
    }
}

/// `tower::Service` implementation delegating to a [`Sender`].
impl<D> Service<BrokerRecord> for SenderService<D>
where
    D: Sender + Clone + Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BrokerRecord) -> Self::Future {
        let mut sender = self.sender.clone();
        Box::pin(async move {
            sender.send(req).await.map_err(Into::into)?;
            Ok(())
        })
    }
}

/// Trait implemented by concrete broker backends.
///
/// A sender is responsible for delivering one [`BrokerRecord`] to an
/// external system (e.g. Kafka or an in-memory queue). It must be
/// callable concurrently from multiple workers; clones share the
/// underlying connection.
#[async_trait::async_trait]
pub trait Sender {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Deliver one record to the broker.
    async fn send(&mut self, record: BrokerRecord) -> Result<(), Self::Error>;
}
