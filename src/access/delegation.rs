// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegated custody lookup.
//!
//! Maps a hot wallet to the cold vaults that authorized it on one or more
//! delegation registries. Registries are queried concurrently and
//! independently: a failing registry contributes nothing and is logged, it
//! never fails the lookup.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use futures::future::join_all;
use tracing::{debug, warn};

use super::cache::TtlCache;
use crate::blockchain::{with_timeout, DelegationRegistry};

/// Max hot wallets held in the delegation cache.
const CACHE_CAPACITY: usize = 10_000;

/// Result of one delegation lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultLookup {
    pub vaults: BTreeSet<Address>,
    /// False when at least one registry failed to answer.
    pub complete: bool,
}

pub struct DelegationResolver {
    registries: Vec<Arc<dyn DelegationRegistry>>,
    cache: TtlCache<Address, BTreeSet<Address>>,
    call_timeout: Duration,
}

impl DelegationResolver {
    pub fn new(
        registries: Vec<Arc<dyn DelegationRegistry>>,
        cache_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registries,
            cache: TtlCache::new(CACHE_CAPACITY, cache_ttl),
            call_timeout,
        }
    }

    /// Vaults that delegated to `hot_wallet`, deduplicated across registries.
    pub async fn find_vaults(&self, hot_wallet: Address) -> BTreeSet<Address> {
        self.lookup(hot_wallet).await.vaults
    }

    /// Like [`find_vaults`](Self::find_vaults), also reporting whether every
    /// registry answered.
    ///
    /// A result is cached only when complete, so a transient registry outage
    /// cannot pin a wallet to an incomplete vault set for a whole TTL.
    pub async fn lookup(&self, hot_wallet: Address) -> VaultLookup {
        if let Some(hit) = self.cache.get(&hot_wallet) {
            return VaultLookup {
                vaults: hit.value,
                complete: true,
            };
        }

        let generation = self.cache.generation(&hot_wallet);
        let lookups = self.registries.iter().map(|registry| async move {
            let result = with_timeout(self.call_timeout, registry.vaults_for(hot_wallet)).await;
            (registry.label(), result)
        });

        let mut vaults = BTreeSet::new();
        let mut complete = true;
        for (label, result) in join_all(lookups).await {
            match result {
                Ok(found) => vaults.extend(found),
                Err(e) => {
                    complete = false;
                    warn!(
                        registry = %label,
                        wallet = %hot_wallet,
                        error = %e,
                        "Delegation registry lookup failed, continuing without it"
                    );
                }
            }
        }

        vaults.remove(&Address::ZERO);
        vaults.remove(&hot_wallet);

        debug!(wallet = %hot_wallet, vaults = vaults.len(), complete, "Resolved delegations");

        if complete {
            self.cache.put_if_current(hot_wallet, vaults.clone(), generation);
        }
        VaultLookup { vaults, complete }
    }

    pub fn invalidate(&self, wallet: &Address) {
        self.cache.invalidate(wallet);
    }

    /// Hot wallets whose cached vault set contains `vault`. Entries expire
    /// with the cache; sessions keep their own vault list for revocation.
    pub fn cached_delegates_of(&self, vault: &Address) -> Vec<Address> {
        self.cache.keys_where(|vaults| vaults.contains(vault))
    }
}
