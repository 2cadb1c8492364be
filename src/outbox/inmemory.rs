use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::outbox::{InsertEntries, MarkProcessed, OutboxEntry, StoredEntry, StreamEntries};

/// An in-memory outbox store for testing or local usage.
///
/// Keeps pending entries in a `HashMap` keyed by message id and records
/// which ids have been marked processed, so tests can assert on relay
/// progress.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    entries: Arc<Mutex<HashMap<Uuid, OutboxEntry>>>,
    processed: Arc<Mutex<Vec<Uuid>>>,
}

impl InMemoryOutbox {
    /// Ids marked processed so far, in acknowledgment order.
    pub async fn processed(&self) -> Vec<Uuid> {
        self.processed.lock().await.clone()
    }

    /// Number of entries still awaiting relay.
    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl InsertEntries for InMemoryOutbox {
    type Error = InMemoryOutboxError;
    type Transaction<'a> = ();

    /// Insert entries into the in-memory store.
    async fn insert_entries(
        &self,
        entries: Vec<OutboxEntry>,
        _tx: &mut Self::Transaction<'_>,
    ) -> Result<(), InMemoryOutboxError> {
        let mut pending = self.entries.lock().await;
        for entry in entries {
            pending.insert(entry.message_id, entry);
        }
        Ok(())
    }
}

#[async_trait]
impl StreamEntries for InMemoryOutbox {
    type Error = InMemoryOutboxError;
    type ID = Uuid;

    /// Stream a snapshot of all pending entries, oldest first.
    async fn entries(
        &self,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'_, Result<StoredEntry<Self::ID>, Self::Error>>, Self::Error> {
        let pending = self.entries.lock().await;
        let mut entries: Vec<_> = pending
            .values()
            .map(|entry| StoredEntry {
                id: entry.message_id,
                entry: entry.clone(),
            })
            .collect();
        entries.sort_by_key(|stored| (stored.entry.occurred_utc, stored.id));
        let entries: Vec<_> = entries.into_iter().map(Ok).collect();
        Ok(Box::pin(tokio_stream::iter(entries)))
    }
}

#[async_trait]
impl MarkProcessed for InMemoryOutbox {
    type Error = InMemoryOutboxError;
    type ID = Uuid;

    /// Remove entries from the pending set and record their ids.
    async fn mark_processed(
        &self,
        entries: Vec<StoredEntry<Self::ID>>,
    ) -> Result<(), InMemoryOutboxError> {
        for stored in entries {
            self.entries
                .lock()
                .await
                .remove(&stored.id)
                .ok_or(InMemoryOutboxError::not_found())?;
            self.processed.lock().await.push(stored.id);
        }
        Ok(())
    }
}

/// Error type for [`InMemoryOutbox`] operations.
#[derive(Debug)]
pub struct InMemoryOutboxError {
    kind: InMemoryOutboxErrorKind,
}

impl InMemoryOutboxError {
    fn not_found() -> Self {
        Self {
            kind: InMemoryOutboxErrorKind::NotFound,
        }
    }
}

impl std::fmt::Display for InMemoryOutboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            InMemoryOutboxErrorKind::NotFound => write!(f, "Entry not found in in-memory store"),
        }
    }
}

impl std::error::Error for InMemoryOutboxError {}

#[derive(Debug)]
enum InMemoryOutboxErrorKind {
    NotFound,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tokio_stream::StreamExt as _;

    use super::*;

    fn entry_at(seconds: i64) -> OutboxEntry {
        OutboxEntry::new(
            Uuid::new_v4(),
            "foo",
            "bar",
            r#"{"type":"bar"}"#,
            Utc.timestamp_opt(seconds, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn streams_pending_entries_oldest_first() {
        let outbox = InMemoryOutbox::default();
        let newer = entry_at(200);
        let older = entry_at(100);
        outbox
            .insert_entries(vec![newer.clone(), older.clone()], &mut ())
            .await
            .unwrap();

        let mut stream = outbox.entries(CancellationToken::new()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();

        assert_eq!(first.entry, older);
        assert_eq!(second.entry, newer);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn mark_processed_removes_and_records() {
        let outbox = InMemoryOutbox::default();
        let entry = entry_at(100);
        outbox
            .insert_entries(vec![entry.clone()], &mut ())
            .await
            .unwrap();

        outbox
            .mark_processed(vec![StoredEntry {
                id: entry.message_id,
                entry: entry.clone(),
            }])
            .await
            .unwrap();

        assert_eq!(outbox.pending().await, 0);
        assert_eq!(outbox.processed().await, vec![entry.message_id]);
    }

    #[tokio::test]
    async fn marking_an_unknown_entry_fails() {
        let outbox = InMemoryOutbox::default();
        let entry = entry_at(100);

        let result = outbox
            .mark_processed(vec![StoredEntry {
                id: entry.message_id,
                entry,
            }])
            .await;

        assert!(result.is_err());
    }
}
