//! Router construction and server host for the API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use swarmhub_telemetry::build_sha;
use swarmhub_torrent_core::MAX_SPEC_BYTES;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::admin::list_connections;
use crate::http::constants::{
    HEADER_ADMIN, HEADER_REQUEST_ID, HEADER_SESSION, HEADER_USER, ROUTE_SOCKET,
};
use crate::http::health::{health, metrics};
use crate::http::magnet::{
    add_magnet, delete_magnet, dir_info, list_magnets, remove_magnet, upload_torrent,
};
use crate::http::socket::socket_handler;
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper hosting the HTTP and socket surface.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over `state`.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let telemetry = state.telemetry.clone();
        let state = Arc::new(state);

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                CONTENT_TYPE,
                HeaderName::from_static(HEADER_USER),
                HeaderName::from_static(HEADER_SESSION),
                HeaderName::from_static(HEADER_ADMIN),
            ]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(swarmhub_telemetry::set_request_id_layer())
            .layer(swarmhub_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::public_routes()
            .merge(Self::api_routes())
            .layer(cors_layer)
            .route_layer(layered)
            .with_state(state);

        Self { router }
    }

    fn public_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
    }

    fn api_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route(ROUTE_SOCKET, get(socket_handler))
            .route("/api/magnet", get(list_magnets).post(add_magnet))
            .route("/api/magnet/remove", post(remove_magnet))
            .route("/api/magnet/delete", post(delete_magnet))
            .route(
                "/api/torrent",
                post(upload_torrent).layer(DefaultBodyLimit::max(MAX_SPEC_BYTES)),
            )
            .route("/api/fs", get(dir_info))
            .route("/api/admin/conns", get(list_connections))
    }

    /// Bind `addr` and serve until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot be bound or the server fails.
    pub async fn serve(self, addr: SocketAddr) -> ApiServerResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error when the server fails.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "serving api");
        }
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| ApiServerError::Serve { source })
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
