//! Completion web-hook.
//!
//! When configured, every completed transfer triggers one JSON POST to the
//! hook URL. Delivery is fire-and-forget: bounded by a timeout, never
//! retried, response body ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use swarmhub_torrent_core::InfoHash;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// `state` value sent with every completion callback.
pub const COMPLETION_STATE: &str = "torrent-completed-exatorrent";

const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPayload {
    /// Hex content hash of the transfer.
    pub metainfo: String,
    /// Transfer name.
    pub name: String,
    /// Always [`COMPLETION_STATE`].
    pub state: String,
    /// When completion was observed.
    pub time: DateTime<Utc>,
}

impl CompletionPayload {
    /// Payload for `hash` completing now.
    #[must_use]
    pub fn new(hash: InfoHash, name: impl Into<String>) -> Self {
        Self {
            metainfo: hash.to_hex(),
            name: name.into(),
            state: COMPLETION_STATE.to_string(),
            time: Utc::now(),
        }
    }
}

/// HTTP client bound to the configured hook URL.
#[derive(Debug, Clone)]
pub struct CompletionHook {
    client: reqwest::Client,
    url: Url,
}

impl CompletionHook {
    /// Build a hook client posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(url: Url) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HOOK_TIMEOUT)
            .build()
            .map_err(|source| AppError::HttpClient { source })?;
        Ok(Self { client, url })
    }

    /// Target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// POST `payload` and return the response status.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be sent or times out.
    pub async fn notify(&self, payload: &CompletionPayload) -> Result<StatusCode, reqwest::Error> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;
        Ok(response.status())
    }

    /// Deliver a completion callback in the background.
    pub fn spawn_notify(&self, hash: InfoHash, name: impl Into<String>) -> JoinHandle<()> {
        let hook = self.clone();
        let payload = CompletionPayload::new(hash, name);
        tokio::spawn(async move {
            match hook.notify(&payload).await {
                Ok(status) if status.is_success() => {
                    debug!(hash = %payload.metainfo, url = %hook.url, "completion hook delivered");
                }
                Ok(status) => warn!(
                    hash = %payload.metainfo,
                    url = %hook.url,
                    status = status.as_u16(),
                    "completion hook answered with failure status"
                ),
                Err(err) => warn!(
                    hash = %payload.metainfo,
                    url = %hook.url,
                    error = %err,
                    "completion hook delivery failed"
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::post};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn capture(
        State(tx): State<mpsc::UnboundedSender<CompletionPayload>>,
        Json(payload): Json<CompletionPayload>,
    ) -> &'static str {
        let _ = tx.send(payload);
        "ignored"
    }

    #[tokio::test]
    async fn posts_completion_payload() -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new().route("/done", post(capture)).with_state(tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let hook = CompletionHook::new(Url::parse(&format!("http://{addr}/done"))?)?;
        let hash = InfoHash::from_bytes([0xab; 20]);
        hook.spawn_notify(hash, "ubuntu.iso").await?;

        let payload = timeout(Duration::from_secs(5), rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("hook never called"))?;
        assert_eq!(payload.metainfo, hash.to_hex());
        assert_eq!(payload.name, "ubuntu.iso");
        assert_eq!(payload.state, COMPLETION_STATE);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_hook_reports_error() -> anyhow::Result<()> {
        let hook = CompletionHook::new(Url::parse("http://127.0.0.1:1/done")?)?;
        let result = hook
            .notify(&CompletionPayload::new(InfoHash::from_bytes([1; 20]), "x"))
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn payload_uses_wire_field_names() -> Result<(), serde_json::Error> {
        let payload = CompletionPayload::new(InfoHash::from_bytes([0; 20]), "name");
        let value = serde_json::to_value(&payload)?;
        assert_eq!(value["state"], "torrent-completed-exatorrent");
        assert_eq!(value["metainfo"], "0".repeat(40));
        assert!(value["time"].is_string());
        Ok(())
    }
}
