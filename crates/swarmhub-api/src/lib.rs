#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! HTTP and WebSocket surface.
//!
//! `GET /api/socket` upgrades to a WebSocket whose identity is supplied by
//! the fronting authentication layer through request headers; the session is
//! registered with the hub and its inbound JSON commands drive the
//! [`TorrentWorkflow`](swarmhub_torrent_core::TorrentWorkflow). The magnet,
//! filesystem, admin, health and metrics endpoints share the same state.

pub mod error;
pub mod http;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use state::ApiState;
