//! Best-effort bridge from local lifecycle events to the external bus.
//!
//! Callers enqueue with [`EventBusPublisher::publish`], which never awaits. A
//! single worker drains the bounded queue into a [`BusSink`]; failures are
//! logged and the event is discarded (at-most-once delivery).

use std::time::Duration;

use async_trait::async_trait;
use swarmhub_telemetry::{BusOutcome, Metrics};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::{EventBusError, EventBusResult};
use crate::nsq::NsqProducer;
use crate::payloads::{BusEvent, DEFAULT_TOPIC, EventKind};

/// Default number of events buffered while the bus is slow.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination the publisher worker writes encoded events to.
#[async_trait]
pub trait BusSink: Send + 'static {
    /// Deliver one encoded event to `topic`.
    async fn publish(&mut self, topic: &str, body: &[u8]) -> EventBusResult<()>;
}

/// Tuning knobs for the publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Topic every event is published to.
    pub topic: String,
    /// Maximum number of events waiting for the worker.
    pub queue_capacity: usize,
    /// Bound on establishing the producer connection.
    pub connect_timeout: Duration,
    /// Bound on one publish exchange once connected.
    pub io_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Handle used to hand lifecycle events to the bus worker.
///
/// Cloning is cheap; all clones feed the same worker. A publisher built with
/// [`EventBusPublisher::disabled`] (or whose bus was unreachable at
/// [`EventBusPublisher::init`]) accepts and discards every event.
#[derive(Clone, Debug)]
pub struct EventBusPublisher {
    queue: Option<mpsc::Sender<BusEvent>>,
    metrics: Option<Metrics>,
}

impl EventBusPublisher {
    /// Connect an NSQ producer at `address` and start the worker.
    ///
    /// A connection failure is logged once and yields a disabled publisher
    /// rather than an error, so the rest of the system keeps running without
    /// the bus.
    pub async fn init(address: &str, config: PublisherConfig, metrics: Option<Metrics>) -> Self {
        match NsqProducer::connect(address, config.connect_timeout).await {
            Ok(producer) => {
                let producer = producer.with_io_timeout(config.io_timeout);
                info!(address = %address, topic = %config.topic, "event bus producer connected");
                Self::spawn(producer, &config, metrics)
            }
            Err(err) => {
                warn!(
                    address = %address,
                    error = %err,
                    "event bus unavailable; lifecycle events will not be published"
                );
                Self {
                    queue: None,
                    metrics,
                }
            }
        }
    }

    /// Start a worker draining into `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn<S: BusSink>(sink: S, config: &PublisherConfig, metrics: Option<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(run_worker(sink, config.topic.clone(), rx, metrics.clone()));
        Self {
            queue: Some(tx),
            metrics,
        }
    }

    /// Publisher that discards every event.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            queue: None,
            metrics: None,
        }
    }

    /// Whether events are forwarded to a worker.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// Enqueue `{hash, kind}` for publication without waiting.
    ///
    /// Returns `true` when the event was queued. A `true` result says nothing
    /// about delivery; the bus may still reject or lose it.
    pub fn publish(&self, hash: impl Into<String>, kind: EventKind) -> bool {
        let Some(queue) = self.queue.as_ref() else {
            self.record(kind, BusOutcome::Dropped);
            return false;
        };

        match queue.try_send(BusEvent::new(hash, kind)) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    hash = %event.hash,
                    kind = %event.event_type,
                    "event bus queue full; dropping lifecycle event"
                );
                self.record(kind, BusOutcome::Dropped);
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(hash = %event.hash, kind = %event.event_type, "event bus worker stopped");
                self.record(kind, BusOutcome::Dropped);
                false
            }
        }
    }

    fn record(&self, kind: EventKind, outcome: BusOutcome) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.inc_bus_event(kind.as_str(), outcome);
        }
    }
}

async fn run_worker<S: BusSink>(
    mut sink: S,
    topic: String,
    mut events: mpsc::Receiver<BusEvent>,
    metrics: Option<Metrics>,
) {
    while let Some(event) = events.recv().await {
        let outcome = match encode(&event) {
            Ok(body) => match sink.publish(&topic, &body).await {
                Ok(()) => {
                    debug!(hash = %event.hash, kind = %event.event_type, "lifecycle event published");
                    BusOutcome::Published
                }
                Err(err) => {
                    warn!(
                        hash = %event.hash,
                        kind = %event.event_type,
                        error = %err,
                        "failed to publish lifecycle event"
                    );
                    BusOutcome::Failed
                }
            },
            Err(err) => {
                warn!(hash = %event.hash, error = %err, "failed to encode lifecycle event");
                BusOutcome::Failed
            }
        };
        if let Some(metrics) = metrics.as_ref() {
            metrics.inc_bus_event(event.event_type.as_str(), outcome);
        }
    }
    debug!(topic = %topic, "event bus worker drained");
}

fn encode(event: &BusEvent) -> EventBusResult<Vec<u8>> {
    serde_json::to_vec(event).map_err(|source| EventBusError::Encode { source })
}
