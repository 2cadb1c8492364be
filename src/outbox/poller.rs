use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::outbox::StoredEntry;

/// A continuously running background poller that produces a stream of
/// pending outbox entries.
///
/// Polling stores (e.g. a relational outbox table) fetch pending entries
/// in batches; the poller adapts such a batch fetch into the per-entry
/// shape [`StreamEntries`](crate::outbox::StreamEntries) implementations
/// hand to the dispatcher. Each fetched entry is sent to `receiver` as
/// `Ok`; fetch errors are sent as `Err`.
pub struct Poller<ID> {
    /// Receiver that yields polled entries or errors.
    pub receiver: mpsc::Receiver<Result<StoredEntry<ID>, tower::BoxError>>,

    /// Handle to the background task. Kept private so the task lives as
    /// long as the `Poller` does.
    _handle: JoinHandle<()>,
}

/// Builder for creating a [`Poller`].
pub struct PollerBuilder {
    interval: Duration,
    channel_size: usize,
}

impl PollerBuilder {
    /// Create a builder with the given polling interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            channel_size: 100,
        }
    }

    /// Set the channel buffer size for fetched entries.
    pub fn channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    /// Start the poller in the background.
    ///
    /// `poll_fn` fetches one batch of pending entries; it runs once per
    /// interval tick until the `CancellationToken` fires or the receiver
    /// is dropped.
    pub fn start<ID, F, Fut>(self, cancel: CancellationToken, mut poll_fn: F) -> Poller<ID>
    where
        ID: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Vec<StoredEntry<ID>>, tower::BoxError>> + Send,
    {
        let (tx, receiver) = mpsc::channel(self.channel_size);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match poll_fn().await {
                            Ok(entries) => {
                                for entry in entries {
                                    if tx.send(Ok(entry)).await.is_err() {
                                        // Receiver dropped, stop polling
                                        return;
                                    }
                                }
                            }
                            Err(err) => {
                                if tx.send(Err(err)).await.is_err() {
                                    // Receiver dropped, stop polling
                                    return;
                                }
                            }
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });

        Poller {
            receiver,
            _handle: handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::outbox::OutboxEntry;

    use super::*;

    fn stored_entry() -> StoredEntry<Uuid> {
        let entry = OutboxEntry::new(
            Uuid::new_v4(),
            "foo",
            "bar",
            r#"{"type":"bar"}"#,
            Utc::now(),
        );
        StoredEntry {
            id: entry.message_id,
            entry,
        }
    }

    #[tokio::test]
    async fn yields_fetched_entries_in_batch_order() {
        let first = stored_entry();
        let second = stored_entry();
        let batches = vec![vec![first.clone(), second.clone()]];
        let mut batches = batches.into_iter();

        let mut poller = PollerBuilder::new(Duration::from_millis(1)).start(
            CancellationToken::new(),
            move || {
                let batch = batches.next().unwrap_or_default();
                async move { Ok(batch) }
            },
        );

        assert_eq!(poller.receiver.recv().await.unwrap().unwrap(), first);
        assert_eq!(poller.receiver.recv().await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn fetch_errors_are_forwarded() {
        let mut poller = PollerBuilder::new(Duration::from_millis(1))
            .start::<Uuid, _, _>(CancellationToken::new(), || async {
                Err("store unavailable".into())
            });

        assert!(poller.receiver.recv().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let cancel = CancellationToken::new();
        let mut poller = PollerBuilder::new(Duration::from_millis(1))
            .start::<Uuid, _, _>(cancel.clone(), || async { Ok(Vec::new()) });

        cancel.cancel();

        assert!(poller.receiver.recv().await.is_none());
    }
}
