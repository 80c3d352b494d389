// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer lifecycle.
//!
//! ## Invariants
//!
//! - Pool allocation and release happen only here, under the table lock
//! - The set of allocated pool addresses equals the set of addresses held by
//!   recorded peers
//! - One peer per public key and at most one peer per wallet
//!
//! The table lock is held across tunnel reconfiguration so the pool, the
//! peer records and the interface change together.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{BackendError, TransferCounters, TunnelBackend};
use super::pool::{AddressPool, PoolError};

/// Parameters every client tunnel gets alongside its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSettings {
    pub server_public_key: String,
    pub server_endpoint: String,
    pub dns: Vec<String>,
    pub allowed_ips: Vec<String>,
}

/// What a client needs to bring its tunnel up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub server_public_key: String,
    pub server_endpoint: String,
    pub client_address: Ipv4Addr,
    pub dns: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// A provisioned tunnel peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub public_key: String,
    pub owner: Address,
    pub address: Ipv4Addr,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub counters: TransferCounters,
    deadline: Instant,
}

impl Peer {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("tunnel reconfiguration failed: {0}")]
    Backend(#[from] BackendError),

    #[error("no peer with public key {0}")]
    UnknownPeer(String),

    #[error("public key {0} is held by another wallet")]
    KeyInUse(String),
}

struct PeerTable {
    pool: AddressPool,
    peers: HashMap<String, Peer>,
}

impl PeerTable {
    fn key_of_owner(&self, owner: &Address) -> Option<String> {
        self.peers
            .values()
            .find(|p| p.owner == *owner)
            .map(|p| p.public_key.clone())
    }
}

pub struct PeerManager {
    table: Mutex<PeerTable>,
    backend: Arc<dyn TunnelBackend>,
    settings: TunnelSettings,
}

impl PeerManager {
    pub fn new(pool: AddressPool, backend: Arc<dyn TunnelBackend>, settings: TunnelSettings) -> Self {
        Self {
            table: Mutex::new(PeerTable {
                pool,
                peers: HashMap::new(),
            }),
            backend,
            settings,
        }
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    /// Provision a peer for `owner`, valid for `ttl`.
    ///
    /// The same wallet presenting the same key gets its existing address back
    /// with a refreshed expiry. A different key replaces the wallet's previous
    /// peer.
    pub async fn add_peer(
        &self,
        owner: Address,
        public_key: &str,
        ttl: Duration,
    ) -> Result<PeerConfig, PeerError> {
        let mut table = self.table.lock().await;

        if let Some(existing) = table.peers.get(public_key) {
            if existing.owner != owner && !existing.is_expired() {
                return Err(PeerError::KeyInUse(public_key.to_string()));
            }
        }

        if let Some(existing) = table.peers.get_mut(public_key) {
            if existing.owner == owner {
                existing.deadline = Instant::now() + ttl;
                existing.expires_at = expiry_after(ttl);
                debug!(wallet = %owner, address = %existing.address, "Peer refreshed");
                return Ok(self.config_for(existing));
            }
        }

        // Stale peer under this key from another wallet, or this wallet's
        // peer under a previous key.
        if table.peers.contains_key(public_key) {
            self.remove_locked(&mut table, public_key).await?;
        }
        if let Some(previous) = table.key_of_owner(&owner) {
            self.remove_locked(&mut table, &previous).await?;
        }

        let address = table.pool.allocate()?;
        if let Err(e) = self.backend.configure_peer(public_key, address).await {
            if let Err(release) = table.pool.release(address) {
                warn!(address = %address, error = %release, "Failed to release address");
            }
            warn!(wallet = %owner, address = %address, error = %e, "Peer configuration failed");
            return Err(e.into());
        }

        let peer = Peer {
            public_key: public_key.to_string(),
            owner,
            address,
            assigned_at: Utc::now(),
            expires_at: expiry_after(ttl),
            counters: TransferCounters::default(),
            deadline: Instant::now() + ttl,
        };
        let config = self.config_for(&peer);
        table.peers.insert(peer.public_key.clone(), peer);

        info!(
            wallet = %owner,
            address = %address,
            available = table.pool.available(),
            "Peer added"
        );
        Ok(config)
    }

    /// Deconfigure a peer and return its address. A backend failure leaves
    /// the peer in place.
    pub async fn remove_peer(&self, public_key: &str) -> Result<Peer, PeerError> {
        let mut table = self.table.lock().await;
        self.remove_locked(&mut table, public_key).await
    }

    /// Like [`remove_peer`](Self::remove_peer), only if `owner` holds the key.
    pub async fn remove_owned_peer(
        &self,
        owner: Address,
        public_key: &str,
    ) -> Result<Peer, PeerError> {
        let mut table = self.table.lock().await;
        let owned = table
            .peers
            .get(public_key)
            .is_some_and(|peer| peer.owner == owner);
        if !owned {
            return Err(PeerError::UnknownPeer(public_key.to_string()));
        }
        self.remove_locked(&mut table, public_key).await
    }

    /// Tear down whatever peer `owner` holds. Backend failures are logged and
    /// the address is reclaimed anyway.
    pub async fn teardown_owner(&self, owner: &Address) -> Option<Peer> {
        let mut table = self.table.lock().await;
        let key = table.key_of_owner(owner)?;
        self.evict_locked(&mut table, &key).await
    }

    /// Evict every expired peer. Returns how many were evicted.
    pub async fn sweep_expired(&self) -> usize {
        let mut table = self.table.lock().await;
        let expired: Vec<String> = table
            .peers
            .values()
            .filter(|p| p.is_expired())
            .map(|p| p.public_key.clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            if self.evict_locked(&mut table, &key).await.is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, available = table.pool.available(), "Swept expired peers");
        }
        evicted
    }

    /// Pull byte counters from the tunnel into the peer records.
    pub async fn refresh_counters(&self) -> Result<(), PeerError> {
        let stats = self.backend.transfer_stats().await?;
        let mut table = self.table.lock().await;
        for (key, counters) in stats {
            if let Some(peer) = table.peers.get_mut(&key) {
                peer.counters = counters;
            }
        }
        Ok(())
    }

    pub async fn get(&self, public_key: &str) -> Option<Peer> {
        self.table.lock().await.peers.get(public_key).cloned()
    }

    pub async fn peer_for_owner(&self, owner: &Address) -> Option<Peer> {
        let table = self.table.lock().await;
        table.peers.values().find(|p| p.owner == *owner).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.table.lock().await.peers.len()
    }

    /// `(capacity, available)` of the address pool.
    pub async fn pool_usage(&self) -> (usize, usize) {
        let table = self.table.lock().await;
        (table.pool.capacity(), table.pool.available())
    }

    /// Addresses the pool considers allocated, ascending.
    pub async fn allocated_addresses(&self) -> Vec<Ipv4Addr> {
        self.table.lock().await.pool.allocated()
    }

    /// Addresses held by recorded peers, ascending.
    pub async fn peer_addresses(&self) -> Vec<Ipv4Addr> {
        let mut addresses: Vec<Ipv4Addr> = self
            .table
            .lock()
            .await
            .peers
            .values()
            .map(|p| p.address)
            .collect();
        addresses.sort();
        addresses
    }

    async fn remove_locked(&self, table: &mut PeerTable, public_key: &str) -> Result<Peer, PeerError> {
        if !table.peers.contains_key(public_key) {
            return Err(PeerError::UnknownPeer(public_key.to_string()));
        }
        self.backend.remove_peer(public_key).await?;
        self.forget_locked(table, public_key)
            .ok_or_else(|| PeerError::UnknownPeer(public_key.to_string()))
    }

    async fn evict_locked(&self, table: &mut PeerTable, public_key: &str) -> Option<Peer> {
        if !table.peers.contains_key(public_key) {
            return None;
        }
        if let Err(e) = self.backend.remove_peer(public_key).await {
            warn!(peer = %public_key, error = %e, "Peer deconfiguration failed, reclaiming address anyway");
        }
        self.forget_locked(table, public_key)
    }

    /// Drop the record and release its address.
    fn forget_locked(&self, table: &mut PeerTable, public_key: &str) -> Option<Peer> {
        let peer = table.peers.remove(public_key)?;
        if let Err(e) = table.pool.release(peer.address) {
            warn!(address = %peer.address, error = %e, "Failed to release address");
        }
        info!(wallet = %peer.owner, address = %peer.address, "Peer removed");
        Some(peer)
    }

    fn config_for(&self, peer: &Peer) -> PeerConfig {
        PeerConfig {
            server_public_key: self.settings.server_public_key.clone(),
            server_endpoint: self.settings.server_endpoint.clone(),
            client_address: peer.address,
            dns: self.settings.dns.clone(),
            allowed_ips: self.settings.allowed_ips.clone(),
            expires_at: peer.expires_at,
        }
    }
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .map(|ttl| Utc::now() + ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
