use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

use crate::transport::{BrokerRecord, Sender};

/// Kafka transport backend.
///
/// Publishes records to Kafka topics using a `FutureProducer`. The
/// record's key drives Kafka's per-partition ordering; the payload is
/// sent as-is, since trace fields already live inside the payload text.
#[derive(Clone)]
pub struct Kafka {
    /// Kafka producer handle
    producer: FutureProducer,
    /// Timeout for sending records
    timeout: Duration,
}

impl Kafka {
    /// Create a new Kafka backend using the given `FutureProducer`.
    ///
    /// Default timeout is 5 seconds.
    pub fn new(producer: FutureProducer) -> Self {
        Self {
            producer,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set a custom timeout for sending records.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Sender for Kafka {
    type Error = rdkafka::error::KafkaError;

    /// Send one record to Kafka.
    ///
    /// Maps the [`BrokerRecord`] fields as follows:
    /// - `record.topic` → Kafka topic
    /// - `record.key` → Kafka message key
    /// - `record.value` → message payload
    async fn send(&mut self, record: BrokerRecord) -> Result<(), Self::Error> {
        let message = FutureRecord::to(&record.topic)
            .payload(record.value.as_bytes())
            .key(record.key.as_bytes());

        self.producer
            .send(message, self.timeout)
            .await
            .map_err(|(e, _)| e)?;

        Ok(())
    }
}
