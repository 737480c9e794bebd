//! WebSocket session handshake and inbound frame loop.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use swarmhub_hub::{SessionIdentity, SessionTransport, TransportError};
use tracing::{debug, info};

use crate::http::commands::handle_frame;
use crate::http::errors::ApiError;
use crate::http::identity::session_identity;
use crate::state::ApiState;

/// Write half of an upgraded socket, owned by the session's write lock.
struct WsTransport {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn send_text(&mut self, payload: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|err| TransportError::new("ws.send", err))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|err| TransportError::new("ws.close", err))
    }
}

/// `GET /api/socket`: upgrade and register a session for the forwarded identity.
pub(crate) async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = session_identity(&headers, remote)?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, identity)))
}

async fn run_session(socket: WebSocket, state: Arc<ApiState>, identity: SessionIdentity) {
    let (sink, inbound) = socket.split();
    let session = state
        .registry
        .connect(identity, WsTransport { sink })
        .await;
    info!(
        user = %session.username(),
        session_id = %session.id(),
        remote = %session.remote_addr(),
        "socket session opened"
    );

    read_frames(&state, &session, inbound).await;

    session.close().await;
    debug!(user = %session.username(), session_id = %session.id(), "socket session finished");
}

async fn read_frames(
    state: &Arc<ApiState>,
    session: &Arc<swarmhub_hub::SessionConnection>,
    mut inbound: SplitStream<WebSocket>,
) {
    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(state, session, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            // axum answers pings itself
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                debug!(user = %session.username(), error = %err, "socket read failed");
                break;
            }
        }
        if !session.is_active() {
            break;
        }
    }
}
