// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the HTTP surface. All types derive
//! `ToSchema` for the OpenAPI document.
//!
//! ## Session Tokens
//!
//! The `session_token` a client presents is the wallet address returned by
//! `/auth/verify`. Sessions are looked up by wallet; the token carries no
//! secret of its own.

use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::access::AccessTier;
use crate::error::ApiError;
use crate::nodes::NodeInfo;
use crate::watcher::WatcherState;

/// Parse a 0x-prefixed wallet address from request input.
pub fn parse_wallet(field: &str, raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("{field} is not a valid wallet address")))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` while the revocation watcher is subscribed, `degraded` otherwise
    pub status: String,
    pub active_sessions: usize,
    pub active_peers: usize,
    pub pool_capacity: usize,
    pub pool_available: usize,
    pub watcher: WatcherState,
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Wallet that will sign the challenge
    pub address: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    /// EIP-4361 message to sign verbatim
    pub message: String,
    pub nonce: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// The challenge message exactly as signed
    pub message: String,
    /// Hex-encoded 65-byte signature
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub address: String,
    pub tier: AccessTier,
    /// Session expiry; absent when access is denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Access comes from a delegated vault
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delegated: bool,
}

// =============================================================================
// VPN
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub session_token: String,
    /// Client WireGuard public key (base64)
    pub public_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub server_public_key: String,
    pub server_endpoint: String,
    /// Client tunnel address in CIDR form, e.g. `10.8.0.2/32`
    pub client_address: String,
    pub dns: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub tier: AccessTier,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DisconnectRequest {
    pub session_token: String,
    pub public_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisconnectResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusQuery {
    pub session_token: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<AccessTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_bytes: Option<u64>,
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct RegionQuery {
    /// Region name, case-insensitive
    pub region: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NodesResponse {
    pub nodes: Vec<NodeInfo>,
    pub count: usize,
}

impl From<Vec<NodeInfo>> for NodesResponse {
    fn from(nodes: Vec<NodeInfo>) -> Self {
        Self {
            count: nodes.len(),
            nodes,
        }
    }
}
