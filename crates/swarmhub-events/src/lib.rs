#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Lifecycle events and the bridge that forwards them to the external bus.
//!
//! Local lifecycle transitions (a transfer was added, started, completed, ...)
//! are described by [`EventKind`]. The [`EventBusPublisher`] hands them to an
//! external topic-based bus on a best-effort basis: a bounded queue drained by
//! one worker task, so the caller never waits on network I/O and a backed-up
//! bus can only cost a bounded amount of memory. When the bus is unreachable
//! the publisher degrades to a silent no-op.

pub mod error;
pub mod nsq;
pub mod payloads;
pub mod publisher;

pub use error::{EventBusError, EventBusResult};
pub use nsq::NsqProducer;
pub use payloads::{BusEvent, DEFAULT_TOPIC, EventKind};
pub use publisher::{BusSink, DEFAULT_QUEUE_CAPACITY, EventBusPublisher, PublisherConfig};
