#![doc = include_str!("../README.md")]

pub mod diagnostics;
mod dispatcher;
pub mod envelope;
pub mod outbox;
mod producer;
pub mod transport;

#[doc(inline)]
pub use envelope::Envelope;

#[doc(inline)]
pub use outbox::{Outbox, OutboxEntry, OutboxError, StoredEntry};

#[doc(inline)]
pub use transport::{BrokerRecord, Sender, Transport, TransportError, TransportErrorKind};

#[doc(inline)]
pub use producer::{OutboxProducer, ProduceError};

#[doc(inline)]
pub use dispatcher::{
    DefaultDispatcherHook, Dispatcher, DispatcherHook, DispatcherRunError, DispatcherRunErrorKind,
};

#[doc(inline)]
pub use diagnostics::{Diagnostics, FlowKind, MessagingOperation};
