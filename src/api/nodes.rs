// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{NodesResponse, RegionQuery},
    nodes::filter_region,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/nodes",
    tag = "Nodes",
    responses(
        (status = 200, body = NodesResponse),
        (status = 502, description = "Node registry unavailable")
    )
)]
pub async fn list_nodes(State(state): State<AppState>) -> Result<Json<NodesResponse>, ApiError> {
    let nodes = state.nodes.list_nodes().await?;
    Ok(Json(nodes.into()))
}

#[utoipa::path(
    get,
    path = "/nodes/region",
    params(RegionQuery),
    tag = "Nodes",
    responses(
        (status = 200, body = NodesResponse),
        (status = 400, description = "Missing region"),
        (status = 502, description = "Node registry unavailable")
    )
)]
pub async fn nodes_by_region(
    State(state): State<AppState>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<NodesResponse>, ApiError> {
    let region = query
        .region
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("region is required"))?;

    let nodes = state.nodes.list_nodes().await?;
    Ok(Json(filter_region(nodes, &region).into()))
}
