#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Telemetry primitives shared across the swarmhub workspace.
//!
//! This crate centralises logging, metrics, and request-id middleware so the
//! hub, the HTTP surface, and the event bus bridge report through one story.
//!
//! Layout: `init.rs` (subscriber setup), `context.rs` (application span),
//! `layers.rs` (request-id middleware), `metrics.rs` (Prometheus registry).

pub mod context;
pub mod error;
pub mod init;
pub mod layers;
pub mod metrics;

pub use context::GlobalContextGuard;
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use layers::{REQUEST_ID_HEADER, propagate_request_id_layer, set_request_id_layer};
pub use metrics::{BusOutcome, Metrics, MetricsSnapshot};
