// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    access::AccessTier,
    models::{
        ChallengeRequest, ChallengeResponse, ConnectRequest, ConnectResponse, DisconnectRequest,
        DisconnectResponse, HealthResponse, NodesResponse, StatusResponse, VerifyRequest,
        VerifyResponse,
    },
    nodes::NodeInfo,
    state::AppState,
    watcher::WatcherState,
};

pub mod auth;
pub mod health;
pub mod nodes;
pub mod vpn;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/challenge", post(auth::challenge))
        .route("/auth/verify", post(auth::verify))
        .route("/vpn/connect", post(vpn::connect))
        .route("/vpn/disconnect", post(vpn::disconnect))
        .route("/vpn/status", get(vpn::status))
        .route("/nodes", get(nodes::list_nodes))
        .route("/nodes/region", get(nodes::nodes_by_region))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::challenge,
        auth::verify,
        vpn::connect,
        vpn::disconnect,
        vpn::status,
        nodes::list_nodes,
        nodes::nodes_by_region
    ),
    components(
        schemas(
            AccessTier,
            WatcherState,
            NodeInfo,
            HealthResponse,
            ChallengeRequest,
            ChallengeResponse,
            VerifyRequest,
            VerifyResponse,
            ConnectRequest,
            ConnectResponse,
            DisconnectRequest,
            DisconnectResponse,
            StatusResponse,
            NodesResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and load"),
        (name = "Auth", description = "Wallet sign-in challenge and verification"),
        (name = "VPN", description = "Tunnel peer provisioning"),
        (name = "Nodes", description = "Gateway node discovery")
    )
)]
struct ApiDoc;
