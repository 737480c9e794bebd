//! Magnet and filesystem endpoints.
//!
//! These requests carry no session identity; transfers they create belong to
//! the configured default user, whose sessions receive the lifecycle
//! notifications.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;
use swarmhub_hub::{Notification, STATE_SUCCESS, TYPE_RESP};
use swarmhub_torrent_core::{
    FsEntry, InfoHash, TorrentSpec, TorrentStatus, spec_from_bytes, spec_from_magnet,
};
use tracing::info;

use crate::http::constants::MSG_SPEC_ADDED;
use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub(crate) struct AddMagnetRequest {
    uri: String,
    #[serde(default, rename = "autoStart")]
    auto_start: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadQuery {
    #[serde(default, rename = "autoStart")]
    auto_start: bool,
    #[serde(default, rename = "noTrackers")]
    no_trackers: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HashRequest {
    hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FsQuery {
    hash: String,
    #[serde(default)]
    dir: String,
}

/// `GET /api/magnet`
pub(crate) async fn list_magnets(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<TorrentStatus>>, ApiError> {
    Ok(Json(state.workflow.list(&state.default_user).await?))
}

/// `POST /api/magnet`
pub(crate) async fn add_magnet(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<AddMagnetRequest>, JsonRejection>,
) -> Result<Json<Notification>, ApiError> {
    let Json(request) = payload?;
    let spec = spec_from_magnet(&request.uri)?;
    let hash = add_for_default_user(&state, spec, request.auto_start).await?;
    info!(hash = %hash, auto_start = request.auto_start, "magnet added over http");
    Ok(spec_added(hash))
}

/// `POST /api/torrent?autoStart=&noTrackers=` with a raw `.torrent` body.
pub(crate) async fn upload_torrent(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Notification>, ApiError> {
    let Query(query) = query?;
    let mut spec = spec_from_bytes(&body)?;
    if query.no_trackers {
        spec.strip_trackers();
    }
    let hash = add_for_default_user(&state, spec, query.auto_start).await?;
    info!(hash = %hash, bytes = body.len(), auto_start = query.auto_start, "torrent uploaded over http");
    Ok(spec_added(hash))
}

async fn add_for_default_user(
    state: &ApiState,
    spec: TorrentSpec,
    auto_start: bool,
) -> Result<InfoHash, ApiError> {
    Ok(state
        .workflow
        .add_spec(&state.default_user, spec, auto_start)
        .await?)
}

fn spec_added(hash: InfoHash) -> Json<Notification> {
    Json(Notification::with_hash(
        TYPE_RESP,
        STATE_SUCCESS,
        hash.to_hex(),
        MSG_SPEC_ADDED,
    ))
}

/// `POST /api/magnet/remove`
pub(crate) async fn remove_magnet(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<HashRequest>, JsonRejection>,
) -> Result<Json<Notification>, ApiError> {
    let Json(request) = payload?;
    let hash = InfoHash::from_hex(&request.hash)?;
    state.workflow.remove(&state.default_user, hash).await?;
    Ok(Json(Notification::success(format!(
        "remove torrent {hash} successfully"
    ))))
}

/// `POST /api/magnet/delete`
pub(crate) async fn delete_magnet(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<HashRequest>, JsonRejection>,
) -> Result<Json<Notification>, ApiError> {
    let Json(request) = payload?;
    let hash = InfoHash::from_hex(&request.hash)?;
    state.workflow.delete(&state.default_user, hash).await?;
    Ok(Json(Notification::success(format!(
        "delete torrent {hash} successfully"
    ))))
}

/// `GET /api/fs?hash=&dir=`
pub(crate) async fn dir_info(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<FsQuery>, QueryRejection>,
) -> Result<Json<Vec<FsEntry>>, ApiError> {
    let Query(query) = query?;
    let hash = InfoHash::from_hex(&query.hash)?;
    Ok(Json(state.workflow.dir_info(hash, &query.dir).await?))
}
