use std::sync::Arc;

use chrono::Utc;
use courier::diagnostics::Diagnostics;
use courier::outbox::inmemory::InMemoryOutbox;
use courier::{Dispatcher, Outbox, OutboxEntry, OutboxProducer, Transport, transport};
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    // The writing side records entries; normally this happens inside the
    // same transaction as the business change.
    let store = InMemoryOutbox::default();
    let mut entries = Vec::new();
    for name in ["alice", "bob"] {
        let id = Uuid::new_v4();
        let payload = format!(
            r#"{{"messageId":"{id}","type":"user-registered","causationId":"{id}","correlationId":"{id}","data":{{"name":"{name}"}}}}"#
        );
        entries.push(OutboxEntry::new(
            id,
            "users",
            "user-registered",
            payload,
            Utc::now(),
        ));
    }
    Outbox::new(store.clone())
        .record_entries(entries, &mut ())
        .await
        .unwrap();

    let broker = transport::InMemory::default();
    let producer = OutboxProducer::with_diagnostics(
        Transport::new(broker.clone()),
        Arc::new(Diagnostics::new()),
    );

    Dispatcher::new(store, producer)
        .run(CancellationToken::new())
        .await
        .unwrap();

    for record in broker.sent_records().await {
        println!(
            "delivered to {} (key {}): {}",
            record.topic, record.key, record.value
        );
    }
}
