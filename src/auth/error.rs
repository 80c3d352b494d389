// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in errors.

use axum::http::StatusCode;

use super::message::MessageError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    /// The message did not parse as a sign-in message
    #[error("malformed sign-in message: {0}")]
    Malformed(#[from] MessageError),

    /// Signature bytes are not a recoverable 65-byte signature
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("message domain {0} does not match this gateway")]
    DomainMismatch(String),

    #[error("message chain id {0} does not match this gateway")]
    ChainMismatch(u64),

    /// Recovered signer differs from the address in the message
    #[error("signature does not match the message address")]
    AddressMismatch,

    /// Nonce was never issued or has already been used
    #[error("unknown or already used nonce")]
    UnknownNonce,

    #[error("challenge has expired")]
    Expired,

    #[error("too many outstanding challenges")]
    TooManyPending,

    #[error("nonce length {0} bytes is below the minimum of 8")]
    NonceTooShort(usize),

    #[error("internal sign-in error: {0}")]
    Internal(String),
}

impl ChallengeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ChallengeError::Malformed(_) => "malformed_message",
            ChallengeError::InvalidSignature(_) => "invalid_signature",
            ChallengeError::DomainMismatch(_) => "domain_mismatch",
            ChallengeError::ChainMismatch(_) => "chain_mismatch",
            ChallengeError::AddressMismatch => "address_mismatch",
            ChallengeError::UnknownNonce => "unknown_nonce",
            ChallengeError::Expired => "challenge_expired",
            ChallengeError::TooManyPending => "too_many_challenges",
            ChallengeError::NonceTooShort(_) | ChallengeError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChallengeError::Malformed(_) | ChallengeError::InvalidSignature(_) => {
                StatusCode::BAD_REQUEST
            }
            ChallengeError::DomainMismatch(_)
            | ChallengeError::ChainMismatch(_)
            | ChallengeError::AddressMismatch
            | ChallengeError::UnknownNonce
            | ChallengeError::Expired => StatusCode::UNAUTHORIZED,
            ChallengeError::TooManyPending => StatusCode::SERVICE_UNAVAILABLE,
            ChallengeError::NonceTooShort(_) | ChallengeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_nonce_is_unauthorized() {
        let err = ChallengeError::UnknownNonce;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "unknown_nonce");
    }

    #[test]
    fn malformed_input_is_a_bad_request() {
        assert_eq!(
            ChallengeError::Malformed(MessageError::MissingHeader).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChallengeError::InvalidSignature("short".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
