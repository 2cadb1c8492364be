//! Outbox entries and the store boundary.
//!
//! The outbox pattern records an event durably in the same transaction as
//! the business change; a relay then forwards it to the broker. This
//! module owns the entry record and the traits a store backend implements.
//! The store is responsible for **durability and selection**; delivery and
//! instrumentation belong to the producer and dispatcher layers.
//!
//! ## Components
//!
//! - [`OutboxEntry`]: one durably-recorded event awaiting relay
//! - [`Outbox`]: high-level façade used by the writing side
//! - [`InsertEntries`]: trait for transactional insertion
//! - [`StreamEntries`]: trait for streaming pending entries
//! - [`MarkProcessed`]: trait for acknowledging relayed entries
//!
//! Concrete backends live in submodules such as [`inmemory`]; polling
//! stores can adapt a batch fetch into the stream shape with [`poller`].

pub mod inmemory;
pub mod poller;

use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use tracing_error::SpanTrace;
use uuid::Uuid;

/// One durably-recorded event awaiting relay.
///
/// Created by the writing side of the outbox pattern; the relay consumes
/// it read-only. The relay may produce a fields-updated *copy* of the
/// payload (trace fields added), never a mutation of the entry itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutboxEntry {
    /// Unique message id, duplicated inside the payload by convention.
    pub message_id: Uuid,
    /// Destination topic.
    pub topic: String,
    /// Partitioning/routing key, typically the event type.
    pub key: String,
    /// Raw JSON payload text, the wire body.
    pub payload: String,
    /// When the domain event occurred.
    pub occurred_utc: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(
        message_id: Uuid,
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: impl Into<String>,
        occurred_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            topic: topic.into(),
            key: key.into(),
            payload: payload.into(),
            occurred_utc,
        }
    }
}

/// Entry as held by a store: the backend-generated identifier plus the
/// entry itself.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry<ID> {
    pub id: ID,
    pub entry: OutboxEntry,
}

/// Error returned by outbox operations.
///
/// Wraps the underlying backend error and captures a tracing span
/// backtrace for diagnostics.
#[derive(Debug)]
pub struct OutboxError {
    context: SpanTrace,
    source: tower::BoxError,
}

impl OutboxError {
    fn backend(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            source: err,
        }
    }
}

impl std::fmt::Display for OutboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Backend error: {}", self.source)?;
        self.context.fmt(f)
    }
}

impl std::error::Error for OutboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// High-level façade over an outbox backend for the writing side.
///
/// Entries are recorded but **not** sent; relay happens asynchronously in
/// the dispatcher. Typically called within the same transaction that
/// mutates application state.
pub struct Outbox<D>(D);

impl<D> Outbox<D>
where
    D: Clone,
{
    pub fn new(driver: D) -> Self {
        Self(driver)
    }

    /// Record entries in the outbox within the caller's transaction.
    #[instrument(skip(self, entries, tx))]
    pub async fn record_entries(
        &self,
        entries: impl IntoIterator<Item = OutboxEntry>,
        tx: &mut D::Transaction<'_>,
    ) -> Result<(), OutboxError>
    where
        D: InsertEntries,
        D::Error: Into<tower::BoxError>,
    {
        let entries: Vec<OutboxEntry> = entries.into_iter().collect();

        self.0
            .insert_entries(entries, tx)
            .await
            .map_err(|e| OutboxError::backend(e.into()))
    }
}

/// Trait for inserting entries into the outbox.
///
/// Implementations must ensure durability and transactional guarantees.
#[async_trait::async_trait]
pub trait InsertEntries {
    /// Backend-specific error type.
    type Error;
    /// Transaction type used for atomic insertion.
    type Transaction<'a>;

    /// Insert a batch of entries into the outbox.
    async fn insert_entries(
        &self,
        entries: Vec<OutboxEntry>,
        tx: &mut Self::Transaction<'_>,
    ) -> Result<(), Self::Error>;
}

/// Trait for streaming pending entries from the outbox.
///
/// The returned stream should yield entries in delivery order and respect
/// cancellation via the provided [`CancellationToken`]. Selection and
/// locking strategy stay the backend's business.
#[async_trait::async_trait]
pub trait StreamEntries {
    /// Backend-specific error type.
    type Error;
    /// Identifier type for stored entries.
    type ID;

    /// Stream pending entries until exhaustion or cancellation.
    async fn entries(
        &self,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'_, Result<StoredEntry<Self::ID>, Self::Error>>, Self::Error>;
}

/// Trait for acknowledging entries that have been relayed.
#[async_trait::async_trait]
pub trait MarkProcessed {
    /// Backend-specific error type.
    type Error;
    /// Identifier type for stored entries.
    type ID;

    /// Mark entries as successfully relayed.
    async fn mark_processed(
        &self,
        entries: Vec<StoredEntry<Self::ID>>,
    ) -> Result<(), Self::Error>;
}
