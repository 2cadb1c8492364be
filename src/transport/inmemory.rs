use std::sync::Arc;

use tokio::sync::Mutex;

use crate::transport::{BrokerRecord, Sender};

/// In-memory transport for testing or local pipelines.
///
/// This transport stores records in a shared in-memory queue and
/// implements the [`Sender`] trait. It is useful for:
/// - Unit and integration testing (as a broker spy)
/// - Simulating message delivery without a real broker
/// - Debugging message flows
#[derive(Clone, Default)]
pub struct InMemory {
    records: Arc<Mutex<Vec<BrokerRecord>>>,
}

impl InMemory {
    /// Return all records that have been "sent" and clear the internal
    /// queue.
    ///
    /// Primarily intended for testing purposes.
    pub async fn sent_records(&self) -> Vec<BrokerRecord> {
        let mut queue = self.records.lock().await;
        std::mem::take(&mut *queue)
    }
}

#[async_trait::async_trait]
impl Sender for InMemory {
    type Error = std::io::Error;

    /// "Send" a record by appending it to the in-memory queue.
    #[tracing::instrument(skip_all)]
    async fn send(&mut self, record: BrokerRecord) -> Result<(), Self::Error> {
        let mut queue = self.records.lock().await;
        tracing::info!(
            topic = %record.topic,
            key = %record.key,
            "Record sent to in-memory queue",
        );
        queue.push(record);
        Ok(())
    }
}
