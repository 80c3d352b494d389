// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration.
//!
//! This module provides:
//! - Contract bindings for the access policy, gated asset, delegation
//!   registries and session manager
//! - The seams (`AccessLedger`, `DelegationRegistry`, `SessionLedger`,
//!   `TransferFeed`) the rest of the gateway depends on
//! - The alloy-backed implementations of those seams
//! - A bounded retry queue for best-effort on-chain writes

pub mod client;
pub mod contracts;
pub mod feed;
pub mod ledger;
pub mod types;
pub mod writer;

pub use client::{LedgerClient, RegistryClient};
pub use feed::LogPollingFeed;
pub use ledger::{AccessLedger, DelegationRegistry, SessionLedger, TransferBatchResult, TransferFeed};
pub use types::*;
pub use writer::{LedgerWrite, LedgerWriteWorker, LedgerWriter, WriteStatsSnapshot};
