//! Seam between a session and the duplex connection it writes to.

use async_trait::async_trait;

use crate::error::TransportError;

/// Outbound half of a live duplex connection.
///
/// Implementations are only ever driven by their owning
/// [`SessionConnection`](crate::SessionConnection), which serialises every
/// call behind its write lock.
#[async_trait]
pub trait SessionTransport: Send + 'static {
    /// Write one text frame.
    async fn send_text(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Close the connection. Called at most once.
    async fn close(&mut self) -> Result<(), TransportError>;
}
