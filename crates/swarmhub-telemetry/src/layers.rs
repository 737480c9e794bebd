//! Request-id middleware for the HTTP and socket surfaces.
//!
//! Every inbound request (including the WebSocket upgrade) gets an `x-request-id`
//! so hub log lines for a session can be correlated with its handshake.

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Layer that assigns a UUID `x-request-id` when the client did not send one.
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer that echoes the request's `x-request-id` on the response.
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
