//! HTTP surface modules (routers, handlers, socket session).

/// Admin-only endpoints.
pub mod admin;
/// Inbound socket commands.
pub mod commands;
/// Shared constants and header names for HTTP surfaces.
pub mod constants;
/// Error rendering shared by every handler.
pub mod errors;
/// Health and diagnostics endpoints.
pub mod health;
/// Session identity supplied by the fronting authentication layer.
pub mod identity;
/// Magnet and filesystem endpoints.
pub mod magnet;
/// Router construction and server host.
pub mod router;
/// WebSocket session handshake and command loop.
pub mod socket;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
