// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tunnel Gate - Token-Gated WireGuard Access Gateway
//!
//! Wallets prove ownership with a signed sign-in message, their access tier
//! is read from an on-chain policy or token balances (directly or through a
//! delegated vault), and a live session buys a WireGuard peer with an address
//! from the gateway's pool. Transfers of the gated asset revoke sessions as
//! they are observed.
//!
//! ## Modules
//!
//! - `access` - Tier resolution, caching and delegation fallback
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Sign-in challenges and signature verification
//! - `blockchain` - Ledger seams and their alloy implementations
//! - `session` - In-memory session gate
//! - `tunnel` - Address pool, WireGuard backend and peer manager
//! - `watcher` - Revocation on asset transfers
//! - `sweeper` - Periodic expiry and teardown

pub mod access;
pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod nodes;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod tunnel;
pub mod watcher;

#[cfg(test)]
mod testing;
