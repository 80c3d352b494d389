// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{info, warn};

use crate::{
    access::AccessTier,
    blockchain::{with_timeout, LedgerError, LedgerWrite},
    error::ApiError,
    models::{
        parse_wallet, ConnectRequest, ConnectResponse, DisconnectRequest, DisconnectResponse,
        StatusQuery, StatusResponse,
    },
    state::AppState,
};

/// Longest accepted tunnel key; base64 of 32 bytes is 44 characters.
const MAX_PUBLIC_KEY_LEN: usize = 64;

/// Cheap shape check before a key reaches the tunnel backend, which does the
/// strict 32-byte decode.
fn check_public_key(key: &str) -> Result<&str, ApiError> {
    let key = key.trim();
    let well_formed = !key.is_empty()
        && key.len() <= MAX_PUBLIC_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='));
    if well_formed {
        Ok(key)
    } else {
        Err(ApiError::bad_request("public_key must be a base64 tunnel key"))
    }
}

/// Provision a tunnel peer for the session's wallet.
#[utoipa::path(
    post,
    path = "/vpn/connect",
    request_body = ConnectRequest,
    tag = "VPN",
    responses(
        (status = 200, body = ConnectResponse),
        (status = 400, description = "Invalid session token or public key"),
        (status = 401, description = "No live session"),
        (status = 402, description = "Paid tier without a confirmed on-chain payment"),
        (status = 403, description = "Access denied"),
        (status = 409, description = "Public key held by another wallet"),
        (status = 503, description = "Address pool exhausted or payments unverifiable")
    )
)]
pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let wallet = parse_wallet("session_token", &request.session_token)?;
    let public_key = check_public_key(&request.public_key)?;

    let session = state
        .sessions
        .get_session(&wallet)
        .await
        .ok_or_else(|| ApiError::unauthorized("no active session"))?;

    if !session.tier.grants_access() {
        return Err(ApiError::forbidden("access denied"));
    }

    if session.tier == AccessTier::Paid {
        match with_timeout(state.ledger_timeout, state.payments.has_paid_session(wallet)).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ApiError::payment_required(
                    "paid tier requires a confirmed on-chain session",
                ))
            }
            Err(LedgerError::NotConfigured(what)) => {
                warn!(wallet = %wallet, missing = what, "Paid session refused, payments cannot be verified");
                return Err(ApiError::service_unavailable(
                    "payment verification is not available",
                ));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let config = state
        .peers
        .add_peer(wallet, public_key, session.remaining())
        .await?;

    info!(wallet = %wallet, address = %config.client_address, tier = %session.tier, "Tunnel connected");

    Ok(Json(ConnectResponse {
        server_public_key: config.server_public_key,
        server_endpoint: config.server_endpoint,
        client_address: format!("{}/32", config.client_address),
        dns: config.dns,
        allowed_ips: config.allowed_ips,
        expires_at: config.expires_at,
        tier: session.tier,
    }))
}

/// Remove the wallet's tunnel peer and close its on-chain session.
#[utoipa::path(
    post,
    path = "/vpn/disconnect",
    request_body = DisconnectRequest,
    tag = "VPN",
    responses(
        (status = 200, body = DisconnectResponse),
        (status = 400, description = "Invalid session token"),
        (status = 401, description = "No live session"),
        (status = 404, description = "No such peer for this wallet")
    )
)]
pub async fn disconnect(
    State(state): State<AppState>,
    Json(request): Json<DisconnectRequest>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let wallet = parse_wallet("session_token", &request.session_token)?;
    let public_key = check_public_key(&request.public_key)?;

    if state.sessions.get_session(&wallet).await.is_none() {
        return Err(ApiError::unauthorized("no active session"));
    }

    state.peers.remove_owned_peer(wallet, public_key).await?;

    if let Some(writer) = &state.writer {
        if writer.enqueue(LedgerWrite::CloseSession(wallet)).is_none() {
            warn!(wallet = %wallet, "On-chain session close not queued");
        }
    }

    info!(wallet = %wallet, "Tunnel disconnected");
    Ok(Json(DisconnectResponse {
        status: "disconnected".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/vpn/status",
    params(StatusQuery),
    tag = "VPN",
    responses(
        (status = 200, body = StatusResponse),
        (status = 400, description = "Invalid session token")
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let wallet = parse_wallet("session_token", &query.session_token)?;

    let Some(session) = state.sessions.get_session(&wallet).await else {
        return Ok(Json(StatusResponse {
            reason: Some("no active session".to_string()),
            ..Default::default()
        }));
    };

    let response = match state.peers.peer_for_owner(&wallet).await {
        Some(peer) => StatusResponse {
            connected: true,
            tier: Some(session.tier),
            expires_at: Some(session.expires_at),
            client_address: Some(format!("{}/32", peer.address)),
            rx_bytes: Some(peer.counters.rx_bytes),
            tx_bytes: Some(peer.counters.tx_bytes),
            ..Default::default()
        },
        None => StatusResponse {
            tier: Some(session.tier),
            expires_at: Some(session.expires_at),
            reason: Some("no tunnel peer".to_string()),
            ..Default::default()
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestGateway;
    use alloy::primitives::Address;
    use axum::http::StatusCode;

    fn wallet() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn connect_request(key: &str) -> Json<ConnectRequest> {
        Json(ConnectRequest {
            session_token: wallet().to_string(),
            public_key: key.to_string(),
        })
    }

    #[tokio::test]
    async fn connect_without_session_is_401() {
        let gateway = TestGateway::new();
        let err = connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn free_session_connects_inside_pool() {
        let gateway = TestGateway::new();
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();

        let Json(body) = connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap();
        assert_eq!(body.client_address, "10.8.0.2/32");
        assert_eq!(body.tier, AccessTier::Free);
        assert_eq!(body.server_endpoint, "vpn.example.org:51820");
        assert_eq!(gateway.state.peers.active_count().await, 1);
    }

    #[tokio::test]
    async fn denied_session_never_reaches_the_pool() {
        let gateway = TestGateway::new();
        // Sessions are only created for granting tiers, so a revoked one
        // looks like no session at all.
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();
        gateway.state.sessions.revoke(&wallet()).await;

        let err = connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(gateway.state.peers.pool_usage().await, (253, 253));
    }

    #[tokio::test]
    async fn key_held_by_another_wallet_is_409() {
        let gateway = TestGateway::new();
        let other = Address::repeat_byte(0x0b);
        for owner in [wallet(), other] {
            gateway
                .state
                .sessions
                .create_session(owner, AccessTier::Free)
                .await
                .unwrap();
        }
        connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap();

        let err = connect(
            State(gateway.state.clone()),
            Json(ConnectRequest {
                session_token: other.to_string(),
                public_key: "K1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unpaid_paid_tier_is_402() {
        let gateway = TestGateway::new();
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Paid)
            .await
            .unwrap();

        let err = connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);

        gateway.session_ledger.set_paid(wallet(), true);
        assert!(connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn paid_tier_without_payment_source_is_refused() {
        let gateway = TestGateway::new();
        gateway.session_ledger.set_unconfigured(true);
        gateway.session_ledger.set_paid(wallet(), true);
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Paid)
            .await
            .unwrap();

        let err = connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(gateway.state.peers.active_count().await, 0);
    }

    #[tokio::test]
    async fn free_tier_ignores_payment_source() {
        let gateway = TestGateway::new();
        gateway.session_ledger.set_unconfigured(true);
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();

        assert!(connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn malformed_public_key_is_400() {
        let gateway = TestGateway::new();
        let err = connect(State(gateway.state.clone()), connect_request("bad key; rm -rf"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disconnect_removes_peer_and_closes_on_chain() {
        let gateway = TestGateway::new();
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();
        connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap();

        let Json(body) = disconnect(
            State(gateway.state.clone()),
            Json(DisconnectRequest {
                session_token: wallet().to_string(),
                public_key: "K1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.status, "disconnected");
        assert_eq!(gateway.state.peers.active_count().await, 0);
        assert_eq!(gateway.writer_stats().submitted, 1);
    }

    #[tokio::test]
    async fn disconnect_of_foreign_key_is_404() {
        let gateway = TestGateway::new();
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();
        let err = disconnect(
            State(gateway.state.clone()),
            Json(DisconnectRequest {
                session_token: wallet().to_string(),
                public_key: "K1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disconnect_without_session_is_401() {
        let gateway = TestGateway::new();
        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();
        connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap();
        gateway.state.sessions.revoke(&wallet()).await;

        let err = disconnect(
            State(gateway.state.clone()),
            Json(DisconnectRequest {
                session_token: wallet().to_string(),
                public_key: "K1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(gateway.state.peers.active_count().await, 1);
        assert_eq!(gateway.writer_stats().submitted, 0);
    }

    #[tokio::test]
    async fn status_reports_connection() {
        let gateway = TestGateway::new();
        let query = || {
            Query(StatusQuery {
                session_token: wallet().to_string(),
            })
        };

        let Json(body) = status(State(gateway.state.clone()), query()).await.unwrap();
        assert!(!body.connected);
        assert_eq!(body.reason.as_deref(), Some("no active session"));

        gateway
            .state
            .sessions
            .create_session(wallet(), AccessTier::Free)
            .await
            .unwrap();
        let Json(body) = status(State(gateway.state.clone()), query()).await.unwrap();
        assert!(!body.connected);
        assert_eq!(body.tier, Some(AccessTier::Free));

        connect(State(gateway.state.clone()), connect_request("K1"))
            .await
            .unwrap();
        let Json(body) = status(State(gateway.state.clone()), query()).await.unwrap();
        assert!(body.connected);
        assert_eq!(body.client_address.as_deref(), Some("10.8.0.2/32"));
        assert_eq!(body.rx_bytes, Some(0));
    }
}
