// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Tunnel Peers
//!
//! - `pool` - bounded client address allocation
//! - `backend` - the interface reconfiguration seam and the `wg` implementation
//! - `manager` - peer records, expiry and the pool/peer invariant

pub mod backend;
pub mod manager;
pub mod pool;

pub use backend::{validate_wg_key, BackendError, TransferCounters, TunnelBackend, WgCommandBackend};
pub use manager::{Peer, PeerConfig, PeerError, PeerManager, TunnelSettings};
pub use pool::{AddressPool, PoolError};
