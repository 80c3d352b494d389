// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Sign-In
//!
//! Proves control of a wallet without any account system.
//!
//! ## Flow
//!
//! 1. Client calls `POST /auth/challenge` with its address
//! 2. Gateway returns an EIP-4361 message with a fresh single-use nonce
//! 3. Wallet signs the message bytes (`personal_sign`)
//! 4. Client posts message + signature to `POST /auth/verify`
//! 5. Gateway recovers the signer, checks domain, chain, expiry and nonce,
//!    then hands the address to the tier resolver
//!
//! ## Security
//!
//! - Nonces come from the OS CSPRNG and are consumed atomically
//! - The verified message is the exact text the wallet signed
//! - Expired challenges are pruned by the session sweeper

pub mod challenge;
pub mod error;
pub mod message;

pub use challenge::{Challenge, ChallengeService, ChallengeSettings, VerifiedIdentity};
pub use error::ChallengeError;
pub use message::{MessageError, SignInMessage};
