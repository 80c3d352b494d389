// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in challenges and wallet signature verification.
//!
//! ## Replay protection
//!
//! Every challenge carries a random nonce recorded as pending. A verification
//! succeeds only if it removes that nonce from the pending set, and removal
//! happens under the store's mutex, so two concurrent verifications of the
//! same signed message cannot both succeed. A failed verification (bad
//! signature, wrong domain) leaves the nonce pending.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, Signature};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, warn};

use super::error::ChallengeError;
use super::message::SignInMessage;

/// Minimum nonce entropy in bytes.
pub const MIN_NONCE_BYTES: usize = 8;

/// Pending-set size above which issuing a challenge prunes expired nonces.
const PRUNE_THRESHOLD: usize = 1024;

/// Hard cap on outstanding challenges.
const MAX_PENDING: usize = 100_000;

/// Static parameters embedded in every challenge.
#[derive(Debug, Clone)]
pub struct ChallengeSettings {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    pub statement: Option<String>,
    pub nonce_bytes: usize,
    pub ttl: Duration,
}

/// An issued challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub message: SignInMessage,
    pub nonce: String,
}

/// A wallet whose signature over a pending challenge checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub address: Address,
}

struct PendingNonce {
    address: Address,
    expires_at: Instant,
}

pub struct ChallengeService {
    settings: ChallengeSettings,
    pending: Mutex<HashMap<String, PendingNonce>>,
    rng: SystemRandom,
}

impl ChallengeService {
    /// Fails if the configured nonce length is below [`MIN_NONCE_BYTES`].
    pub fn new(settings: ChallengeSettings) -> Result<Self, ChallengeError> {
        if settings.nonce_bytes < MIN_NONCE_BYTES {
            return Err(ChallengeError::NonceTooShort(settings.nonce_bytes));
        }
        Ok(Self {
            settings,
            pending: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        })
    }

    pub fn settings(&self) -> &ChallengeSettings {
        &self.settings
    }

    /// Issue a challenge for `address` and record its nonce as pending.
    pub fn issue(&self, address: Address) -> Result<Challenge, ChallengeError> {
        let nonce = self.generate_nonce()?;
        let issued_at = Utc::now();
        let expiration = chrono::Duration::from_std(self.settings.ttl)
            .ok()
            .map(|ttl| issued_at + ttl);

        {
            let mut pending = self.lock_pending()?;
            if pending.len() >= PRUNE_THRESHOLD {
                let now = Instant::now();
                pending.retain(|_, p| p.expires_at > now);
            }
            if pending.len() >= MAX_PENDING {
                return Err(ChallengeError::TooManyPending);
            }
            pending.insert(
                nonce.clone(),
                PendingNonce {
                    address,
                    expires_at: Instant::now() + self.settings.ttl,
                },
            );
        }

        let message = SignInMessage {
            domain: self.settings.domain.clone(),
            address,
            statement: self.settings.statement.clone(),
            uri: self.settings.uri.clone(),
            chain_id: self.settings.chain_id,
            nonce: nonce.clone(),
            issued_at,
            expiration_time: expiration,
        };

        debug!(wallet = %address, "Issued sign-in challenge");
        Ok(Challenge { message, nonce })
    }

    /// Verify a signed challenge and consume its nonce.
    ///
    /// `signature` is a hex-encoded 65-byte personal-message signature over
    /// the exact bytes of `message`.
    pub fn verify(&self, message: &str, signature: &str) -> Result<VerifiedIdentity, ChallengeError> {
        let parsed: SignInMessage = message.parse()?;

        if parsed.domain != self.settings.domain {
            return Err(ChallengeError::DomainMismatch(parsed.domain));
        }
        if parsed.chain_id != self.settings.chain_id {
            return Err(ChallengeError::ChainMismatch(parsed.chain_id));
        }

        let recovered = recover_signer(message, signature)?;
        if recovered != parsed.address {
            return Err(ChallengeError::AddressMismatch);
        }

        if let Some(expiration) = parsed.expiration_time {
            if Utc::now() > expiration {
                return Err(ChallengeError::Expired);
            }
        }

        self.consume(&parsed.nonce, recovered)?;

        debug!(wallet = %recovered, "Verified wallet signature");
        Ok(VerifiedIdentity { address: recovered })
    }

    /// Atomically remove a pending nonce.
    fn consume(&self, nonce: &str, signer: Address) -> Result<(), ChallengeError> {
        let entry = self
            .lock_pending()?
            .remove(nonce)
            .ok_or(ChallengeError::UnknownNonce)?;

        if Instant::now() > entry.expires_at {
            return Err(ChallengeError::Expired);
        }
        if entry.address != signer {
            warn!(wallet = %signer, issued_to = %entry.address, "Nonce presented by a different wallet");
            return Err(ChallengeError::AddressMismatch);
        }
        Ok(())
    }

    /// Drop expired pending nonces. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        match self.pending.lock() {
            Ok(mut pending) => {
                let before = pending.len();
                pending.retain(|_, p| p.expires_at > now);
                before - pending.len()
            }
            Err(_) => 0,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn generate_nonce(&self) -> Result<String, ChallengeError> {
        let mut bytes = vec![0u8; self.settings.nonce_bytes];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| ChallengeError::Internal("system randomness unavailable".to_string()))?;
        Ok(alloy::hex::encode(bytes))
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, PendingNonce>>, ChallengeError> {
        self.pending
            .lock()
            .map_err(|_| ChallengeError::Internal("nonce store lock poisoned".to_string()))
    }
}

/// Recover the address that produced a personal-message signature.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, ChallengeError> {
    let bytes = alloy::hex::decode(signature.trim())
        .map_err(|e| ChallengeError::InvalidSignature(e.to_string()))?;
    let signature = Signature::from_raw(&bytes)
        .map_err(|e| ChallengeError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| ChallengeError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settings, sign};
    use alloy::signers::local::PrivateKeySigner;
    use std::sync::Arc;

    fn service() -> ChallengeService {
        ChallengeService::new(settings()).unwrap()
    }

    #[test]
    fn rejects_short_nonce_configuration() {
        let mut short = settings();
        short.nonce_bytes = 7;
        assert!(matches!(
            ChallengeService::new(short),
            Err(ChallengeError::NonceTooShort(7))
        ));
    }

    #[test]
    fn issued_message_embeds_settings() {
        let service = service();
        let address = Address::repeat_byte(0x42);
        let challenge = service.issue(address).unwrap();

        assert_eq!(challenge.nonce.len(), service.settings().nonce_bytes * 2);
        assert_eq!(challenge.message.nonce, challenge.nonce);
        assert_eq!(challenge.message.domain, "vpn.example.org");
        assert_eq!(challenge.message.chain_id, 137);
        assert_eq!(challenge.message.address, address);
        assert_eq!(service.pending_count(), 1);
    }

    #[test]
    fn nonces_are_unique() {
        let service = service();
        let a = service.issue(Address::ZERO).unwrap();
        let b = service.issue(Address::ZERO).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn valid_signature_verifies_once() {
        let service = service();
        let signer = PrivateKeySigner::random();
        let challenge = service.issue(signer.address()).unwrap();
        let message = challenge.message.to_string();
        let signature = sign(&signer, &message);

        let identity = service.verify(&message, &signature).unwrap();
        assert_eq!(identity.address, signer.address());

        assert_eq!(
            service.verify(&message, &signature),
            Err(ChallengeError::UnknownNonce)
        );
    }

    #[test]
    fn concurrent_verifications_of_one_nonce_succeed_once() {
        let service = Arc::new(service());
        let signer = PrivateKeySigner::random();
        let message = service.issue(signer.address()).unwrap().message.to_string();
        let signature = sign(&signer, &message);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let message = message.clone();
                let signature = signature.clone();
                std::thread::spawn(move || service.verify(&message, &signature).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn signature_from_other_wallet_is_rejected() {
        let service = service();
        let owner = PrivateKeySigner::random();
        let attacker = PrivateKeySigner::random();
        let message = service.issue(owner.address()).unwrap().message.to_string();

        let result = service.verify(&message, &sign(&attacker, &message));
        assert_eq!(result, Err(ChallengeError::AddressMismatch));
        // A failed attempt does not burn the nonce.
        assert!(service.verify(&message, &sign(&owner, &message)).is_ok());
    }

    #[test]
    fn tampered_message_is_rejected() {
        let service = service();
        let signer = PrivateKeySigner::random();
        let message = service.issue(signer.address()).unwrap().message.to_string();
        let signature = sign(&signer, &message);

        let tampered = message.replace("Chain ID: 137", "Chain ID: 1");
        assert!(service.verify(&tampered, &signature).is_err());
    }

    #[test]
    fn domain_mismatch_is_rejected() {
        let service = service();
        let signer = PrivateKeySigner::random();
        let mut message = service.issue(signer.address()).unwrap().message;
        message.domain = "phish.example.org".to_string();
        let text = message.to_string();

        let result = service.verify(&text, &sign(&signer, &text));
        assert_eq!(
            result,
            Err(ChallengeError::DomainMismatch("phish.example.org".to_string()))
        );
    }

    #[test]
    fn unknown_nonce_is_rejected() {
        let service = service();
        let signer = PrivateKeySigner::random();
        let mut message = service.issue(signer.address()).unwrap().message;
        message.nonce = "ffffffffffffffff".to_string();
        let text = message.to_string();

        assert_eq!(
            service.verify(&text, &sign(&signer, &text)),
            Err(ChallengeError::UnknownNonce)
        );
    }

    #[test]
    fn expired_nonce_is_rejected_and_pruned() {
        let mut short = settings();
        short.ttl = Duration::from_millis(1);
        let service = ChallengeService::new(short).unwrap();
        let signer = PrivateKeySigner::random();
        let message = service.issue(signer.address()).unwrap().message.to_string();
        std::thread::sleep(Duration::from_millis(1100));

        let result = service.verify(&message, &sign(&signer, &message));
        assert_eq!(result, Err(ChallengeError::Expired));

        service.issue(signer.address()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(service.prune_expired(), 1);
        assert_eq!(service.pending_count(), 0);
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let service = service();
        let message = service
            .issue(Address::repeat_byte(1))
            .unwrap()
            .message
            .to_string();

        assert!(matches!(
            service.verify(&message, "0x1234"),
            Err(ChallengeError::InvalidSignature(_))
        ));
        assert!(matches!(
            service.verify(&message, "not-hex"),
            Err(ChallengeError::InvalidSignature(_))
        ));
    }
}
