//! Shared state handed to every handler.

use std::sync::Arc;

use swarmhub_hub::ConnectionRegistry;
use swarmhub_telemetry::Metrics;
use swarmhub_torrent_core::TorrentWorkflow;

/// Dependencies of the HTTP and socket handlers.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) workflow: Arc<dyn TorrentWorkflow>,
    pub(crate) telemetry: Metrics,
    pub(crate) default_user: String,
    pub(crate) spec_client: Option<reqwest::Client>,
    pub(crate) bus_enabled: bool,
}

impl ApiState {
    /// Bundle handler dependencies.
    ///
    /// `default_user` owns transfers created through the magnet endpoints,
    /// which carry no session identity.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        workflow: Arc<dyn TorrentWorkflow>,
        telemetry: Metrics,
        default_user: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            workflow,
            telemetry,
            default_user: default_user.into(),
            spec_client: None,
            bus_enabled: false,
        }
    }

    /// HTTP client used to download `.torrent` files for `addurl`.
    ///
    /// Without one, URL sources are rejected.
    #[must_use]
    pub fn with_spec_client(mut self, client: reqwest::Client) -> Self {
        self.spec_client = Some(client);
        self
    }

    /// Record whether lifecycle events reach an external bus; reported by `/health`.
    #[must_use]
    pub fn with_bus_enabled(mut self, enabled: bool) -> Self {
        self.bus_enabled = enabled;
        self
    }

    /// Registry of live sessions.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}
