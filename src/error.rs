// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::ChallengeError;
use crate::blockchain::LedgerError;
use crate::nodes::NodeDirectoryError;
use crate::tunnel::{BackendError, PeerError, PoolError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Machine-readable reason, when the source error has one.
    pub code: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

impl From<ChallengeError> for ApiError {
    fn from(e: ChallengeError) -> Self {
        Self::new(e.status_code(), e.to_string()).with_code(e.error_code())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        warn!(error = %e, "Ledger request failed");
        match e {
            LedgerError::Timeout(_) => Self::gateway_timeout("ledger did not respond in time"),
            LedgerError::NotConfigured(_)
            | LedgerError::InvalidRpcUrl(_)
            | LedgerError::InvalidPrivateKey(_) => Self::internal("ledger is not configured"),
            LedgerError::Rpc(_) | LedgerError::Contract(_) | LedgerError::TransactionFailed(_) => {
                Self::bad_gateway("ledger request failed")
            }
        }
    }
}

impl From<PeerError> for ApiError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Pool(PoolError::Exhausted) => {
                Self::service_unavailable("address pool exhausted").with_code("pool_exhausted")
            }
            PeerError::Pool(other) => {
                error!(error = %other, "Address pool inconsistency");
                Self::internal("address pool error")
            }
            PeerError::Backend(BackendError::InvalidKey(key)) => {
                Self::bad_request(format!("invalid tunnel public key: {key}"))
            }
            PeerError::Backend(other) => {
                error!(error = %other, "Tunnel reconfiguration failed");
                Self::bad_gateway("tunnel reconfiguration failed")
            }
            PeerError::UnknownPeer(_) => Self::not_found("no such peer for this session"),
            PeerError::KeyInUse(_) => Self::conflict("public key is in use by another wallet"),
        }
    }
}

impl From<NodeDirectoryError> for ApiError {
    fn from(e: NodeDirectoryError) -> Self {
        warn!(error = %e, "Node directory lookup failed");
        Self::bad_gateway("node registry unavailable")
    }
}
