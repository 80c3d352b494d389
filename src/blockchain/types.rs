// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger types shared by the client, the transfer feed and the fakes.

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};

/// EVM network the gateway reads from.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for logs
    pub name: String,
    /// Chain ID (also embedded in sign-in messages)
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
}

/// How the direct tier of a wallet is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// `checkAccess(address) -> (bool access, bool free)` on a policy contract.
    PolicyContract(Address),
    /// `balanceOfBatch` on the gated ERC-1155 for the free and paid token ids.
    TokenBalances { free_token_id: U256, paid_token_id: U256 },
}

/// Delegation registry flavours understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// delegate.xyz v1 (`getDelegationsByDelegate`).
    V1,
    /// delegate.xyz v2 (`getIncomingDelegations`).
    V2,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKind::V1 => write!(f, "v1"),
            RegistryKind::V2 => write!(f, "v2"),
        }
    }
}

/// A configured delegation registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub kind: RegistryKind,
    pub address: Address,
}

/// A single `TransferSingle` or `TransferBatch` observed on the gated asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl TransferEvent {
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            block_number: None,
            tx_hash: None,
        }
    }

    /// Sender, unless the transfer is a mint.
    pub fn sender(&self) -> Option<Address> {
        (self.from != Address::ZERO).then_some(self.from)
    }

    /// Receiver, unless the transfer is a burn.
    pub fn receiver(&self) -> Option<Address> {
        (self.to != Address::ZERO).then_some(self.to)
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

/// Run a ledger future under a deadline, mapping elapsed time to
/// [`LedgerError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, LedgerError>
where
    F: std::future::Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit)),
    }
}
