// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger seams.
//!
//! Every component that reads from or writes to the chain depends on one of
//! these traits rather than on the alloy client, so tier resolution,
//! delegation and revocation can be exercised against in-memory fakes.

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{LedgerError, TransferEvent};
use crate::access::AccessTier;

/// Direct tier lookup for a single wallet.
#[async_trait]
pub trait AccessLedger: Send + Sync {
    async fn check_access(&self, wallet: Address) -> Result<AccessTier, LedgerError>;
}

/// One on-chain delegation registry.
#[async_trait]
pub trait DelegationRegistry: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> String;

    /// Vault wallets that delegated to `hot_wallet` for the gated asset.
    async fn vaults_for(&self, hot_wallet: Address) -> Result<Vec<Address>, LedgerError>;
}

/// Payment and session bookkeeping contract.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Whether a paid session is confirmed on-chain for the wallet.
    async fn has_paid_session(&self, wallet: Address) -> Result<bool, LedgerError>;

    /// Record a free-tier session on-chain.
    async fn open_free_session(&self, wallet: Address) -> Result<(), LedgerError>;

    /// Close the wallet's on-chain session.
    async fn close_session(&self, wallet: Address) -> Result<(), LedgerError>;
}

/// Item delivered on a transfer subscription.
pub type TransferBatchResult = Result<Vec<TransferEvent>, LedgerError>;

/// Source of transfer events for the gated asset.
///
/// A subscription ends when the channel closes. An `Err` item reports why;
/// the subscriber is expected to resubscribe.
#[async_trait]
pub trait TransferFeed: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::Receiver<TransferBatchResult>, LedgerError>;
}
