//! Admin-only endpoints.

use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap};
use swarmhub_hub::{DataMsg, UserConnMsg};

use crate::http::errors::ApiError;
use crate::http::identity::is_admin;
use crate::state::ApiState;

/// `GET /api/admin/conns`: every live session.
pub(crate) async fn list_connections(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<DataMsg<Vec<UserConnMsg>>>, ApiError> {
    if !is_admin(&headers) {
        return Err(ApiError::forbidden("admin access required"));
    }
    Ok(Json(state.registry.list_users()))
}
