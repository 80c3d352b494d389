// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::models::HealthResponse;
use crate::state::AppState;
use crate::watcher::WatcherState;

/// Liveness and load summary.
///
/// Always 200. `status` reports `degraded` while the revocation watcher is
/// not subscribed, since revocations are not being observed then.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is running", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let watcher = *state.watcher.borrow();
    let (pool_capacity, pool_available) = state.peers.pool_usage().await;

    Json(HealthResponse {
        status: match watcher {
            WatcherState::Subscribed => "ok",
            WatcherState::Disconnected => "degraded",
        }
        .to_string(),
        active_sessions: state.sessions.active_count().await,
        active_peers: state.peers.active_count().await,
        pool_capacity,
        pool_available,
        watcher,
    })
}
