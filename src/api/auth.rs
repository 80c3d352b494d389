// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};

use crate::{
    access::AccessTier,
    blockchain::LedgerWrite,
    error::ApiError,
    models::{parse_wallet, ChallengeRequest, ChallengeResponse, VerifyRequest, VerifyResponse},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/auth/challenge",
    request_body = ChallengeRequest,
    tag = "Auth",
    responses(
        (status = 200, body = ChallengeResponse),
        (status = 400, description = "Invalid address")
    )
)]
pub async fn challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let address = parse_wallet("address", &request.address)?;
    let challenge = state.challenges.issue(address)?;
    Ok(Json(ChallengeResponse {
        message: challenge.message.to_string(),
        nonce: challenge.nonce,
    }))
}

/// Verify a signed challenge, resolve the wallet's tier and open a session.
///
/// A wallet without access gets 403 with `tier: "denied"` and no session.
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Session opened", body = VerifyResponse),
        (status = 400, description = "Malformed message or signature"),
        (status = 401, description = "Signature, domain or nonce rejected"),
        (status = 403, description = "Wallet holds no qualifying asset", body = VerifyResponse),
        (status = 502, description = "Ledger unavailable"),
        (status = 504, description = "Ledger timed out")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<(StatusCode, Json<VerifyResponse>), ApiError> {
    let identity = state
        .challenges
        .verify(&request.message, &request.signature)?;
    let wallet = identity.address;
    let resolved = state.tiers.resolve(wallet).await?;

    if !resolved.tier.grants_access() {
        // A session from before the asset moved must not survive.
        state.sessions.revoke(&wallet).await;
        info!(wallet = %wallet, "Sign-in denied, no qualifying asset");
        return Ok((
            StatusCode::FORBIDDEN,
            Json(VerifyResponse {
                address: wallet.to_string(),
                tier: AccessTier::Denied,
                expires_at: None,
                delegated: false,
            }),
        ));
    }

    let session = state
        .sessions
        .create_delegated_session(wallet, resolved.tier, resolved.vaults)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if session.tier == AccessTier::Free {
        if let Some(writer) = &state.writer {
            if writer.enqueue(LedgerWrite::OpenFreeSession(wallet)).is_none() {
                warn!(wallet = %wallet, "Free session not recorded on-chain");
            }
        }
    }

    Ok((
        StatusCode::OK,
        Json(VerifyResponse {
            address: wallet.to_string(),
            tier: session.tier,
            expires_at: Some(session.expires_at),
            delegated: resolved.delegated,
        }),
    ))
}
