//! In-memory doubles for sessions and the bus, used by tests across the workspace.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use swarmhub_events::{BusEvent, BusSink, EventBusError, EventBusResult};

use crate::error::TransportError;
use crate::messages::Notification;
use crate::transport::SessionTransport;

#[derive(Debug, Default)]
struct TransportState {
    frames: Mutex<Vec<String>>,
    closes: AtomicUsize,
    failing: AtomicBool,
    writing: AtomicBool,
    overlaps: AtomicUsize,
}

/// Transport that records every frame and flags overlapping writes.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<TransportState>,
    write_delay: Duration,
}

impl RecordingTransport {
    /// Healthy transport with instant writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write take `delay`.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Frames written so far.
    #[must_use]
    pub fn frames(&self) -> Vec<String> {
        self.state
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames written so far, decoded as notifications; other frames are skipped.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// How many times the transport was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// How many writes started while another was still in progress.
    #[must_use]
    pub fn overlapping_writes(&self) -> usize {
        self.state.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for RecordingTransport {
    async fn send_text(&mut self, payload: &str) -> Result<(), TransportError> {
        if self.state.writing.swap(true, Ordering::SeqCst) {
            self.state.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        let result = if self.state.failing.load(Ordering::SeqCst) {
            Err(TransportError::new("recording.send", "transport failing"))
        } else {
            self.state
                .frames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(payload.to_string());
            Ok(())
        };
        self.state.writing.store(false, Ordering::SeqCst);
        result
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Bus sink that keeps every published event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<BusEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    /// Sink accepting every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events accepted so far.
    #[must_use]
    pub fn events(&self) -> Vec<BusEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` events arrived or `limit` elapsed, then return them.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<BusEvent> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let events = self.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl BusSink for RecordingSink {
    async fn publish(&mut self, _topic: &str, body: &[u8]) -> EventBusResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventBusError::Protocol {
                reason: "recording_sink_failing",
            });
        }
        let event: BusEvent =
            serde_json::from_slice(body).map_err(|source| EventBusError::Encode { source })?;
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
