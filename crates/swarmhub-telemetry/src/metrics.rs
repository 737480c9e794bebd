//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges the hub, HTTP surface and bus bridge care about.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Outcome label recorded for lifecycle events handed to the external bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOutcome {
    /// The bus acknowledged the event.
    Published,
    /// The bus rejected the event or the connection failed.
    Failed,
    /// The event never reached the bus (queue full or publisher disabled).
    Dropped,
}

impl BusOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    bus_events_total: IntCounterVec,
    active_sessions: IntGauge,
    connected_users: IntGauge,
    notifications_sent_total: IntCounter,
    session_send_failures_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Sessions currently registered with the hub.
    pub active_sessions: i64,
    /// Distinct users with at least one session.
    pub connected_users: i64,
    /// Notifications successfully written to sessions.
    pub notifications_sent_total: u64,
    /// Session writes that failed and evicted the session.
    pub session_send_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )
        .map_err(|source| collector("http_requests_total", source))?;
        let bus_events_total = IntCounterVec::new(
            Opts::new(
                "bus_events_total",
                "Lifecycle events handed to the external bus by kind and outcome",
            ),
            &["kind", "outcome"],
        )
        .map_err(|source| collector("bus_events_total", source))?;
        let active_sessions = IntGauge::with_opts(Opts::new(
            "active_sessions",
            "Sessions currently registered with the hub",
        ))
        .map_err(|source| collector("active_sessions", source))?;
        let connected_users = IntGauge::with_opts(Opts::new(
            "connected_users",
            "Users with at least one live session",
        ))
        .map_err(|source| collector("connected_users", source))?;
        let notifications_sent_total = IntCounter::with_opts(Opts::new(
            "notifications_sent_total",
            "Notifications written to sessions",
        ))
        .map_err(|source| collector("notifications_sent_total", source))?;
        let session_send_failures_total = IntCounter::with_opts(Opts::new(
            "session_send_failures_total",
            "Session writes that failed and evicted the session",
        ))
        .map_err(|source| collector("session_send_failures_total", source))?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "bus_events_total", &bus_events_total)?;
        register(&registry, "active_sessions", &active_sessions)?;
        register(&registry, "connected_users", &connected_users)?;
        register(
            &registry,
            "notifications_sent_total",
            &notifications_sent_total,
        )?;
        register(
            &registry,
            "session_send_failures_total",
            &session_send_failures_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                bus_events_total,
                active_sessions,
                connected_users,
                notifications_sent_total,
                session_send_failures_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        let code = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[route, code.as_str()])
            .inc();
    }

    /// Record the outcome of handing a lifecycle event to the bus.
    pub fn inc_bus_event(&self, kind: &str, outcome: BusOutcome) {
        self.inner
            .bus_events_total
            .with_label_values(&[kind, outcome.as_str()])
            .inc();
    }

    /// Publish the current hub population.
    pub fn set_hub_population(&self, sessions: usize, users: usize) {
        self.inner
            .active_sessions
            .set(i64::try_from(sessions).unwrap_or(i64::MAX));
        self.inner
            .connected_users
            .set(i64::try_from(users).unwrap_or(i64::MAX));
    }

    /// Add successfully delivered notifications.
    pub fn add_notifications_sent(&self, count: usize) {
        self.inner
            .notifications_sent_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Increment the session write failure counter.
    pub fn inc_session_send_failure(&self) {
        self.inner.session_send_failures_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the hub gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.inner.active_sessions.get(),
            connected_users: self.inner.connected_users.get(),
            notifications_sent_total: self.inner.notifications_sent_total.get(),
            session_send_failures_total: self.inner.session_send_failures_total.get(),
        }
    }
}

const fn collector(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsCollector { name, source }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_includes_registered_collectors() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/api/magnet", 200);
        metrics.inc_bus_event("added", BusOutcome::Published);
        metrics.set_hub_population(3, 2);
        metrics.add_notifications_sent(4);
        metrics.inc_session_send_failure();

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("bus_events_total"));
        assert!(rendered.contains("outcome=\"published\""));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_sessions, 3);
        assert_eq!(snapshot.connected_users, 2);
        assert_eq!(snapshot.notifications_sent_total, 4);
        assert_eq!(snapshot.session_send_failures_total, 1);
        Ok(())
    }
}
