// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cached tier resolution.
//!
//! ## Resolution order
//!
//! 1. Live cache entry, if any.
//! 2. Direct ledger read for the wallet.
//! 3. If the direct tier is `Denied` and delegation is configured: every
//!    vault that delegated to the wallet is read directly and the best tier
//!    wins, stopping at `Free`.
//!
//! Only complete answers are cached. A lookup that lost a vault or registry
//! to an upstream failure is returned but re-derived on the next call, and
//! an answer whose wallet was invalidated while it was being read is
//! returned but never cached.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::cache::TtlCache;
use super::delegation::DelegationResolver;
use super::tier::AccessTier;
use crate::blockchain::{with_timeout, AccessLedger, LedgerError};

/// Max wallets held in the tier cache.
const CACHE_CAPACITY: usize = 10_000;

/// A resolved tier and when it was derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTier {
    pub tier: AccessTier,
    pub computed_at: DateTime<Utc>,
    /// Served from cache without a ledger read.
    pub cached: bool,
    /// Granted through a delegated vault rather than direct ownership.
    pub delegated: bool,
    /// Vaults that granted the tier when delegated.
    pub vaults: Vec<Address>,
}

pub struct TierResolver {
    ledger: Arc<dyn AccessLedger>,
    delegations: Option<Arc<DelegationResolver>>,
    cache: TtlCache<Address, (AccessTier, Vec<Address>)>,
    call_timeout: Duration,
}

impl TierResolver {
    pub fn new(
        ledger: Arc<dyn AccessLedger>,
        delegations: Option<Arc<DelegationResolver>>,
        cache_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            delegations,
            cache: TtlCache::new(CACHE_CAPACITY, cache_ttl),
            call_timeout,
        }
    }

    /// Resolve the wallet's tier, from cache when possible.
    ///
    /// Fails only when the direct read for `wallet` itself fails or times
    /// out; vault and registry failures degrade to "not granted by that
    /// source".
    pub async fn resolve(&self, wallet: Address) -> Result<ResolvedTier, LedgerError> {
        if let Some(hit) = self.cache.get(&wallet) {
            let (tier, vaults) = hit.value;
            debug!(wallet = %wallet, tier = %tier, "Tier cache hit");
            return Ok(ResolvedTier {
                tier,
                computed_at: hit.computed_at,
                cached: true,
                delegated: !vaults.is_empty(),
                vaults,
            });
        }

        let generation = self.cache.generation(&wallet);
        let direct = with_timeout(self.call_timeout, self.ledger.check_access(wallet)).await?;

        let (tier, vaults, complete) = match (&self.delegations, direct) {
            (Some(delegations), AccessTier::Denied) => {
                self.best_vault_tier(wallet, delegations).await
            }
            _ => (direct, Vec::new(), true),
        };
        let delegated = !vaults.is_empty();

        info!(wallet = %wallet, tier = %tier, delegated, "Resolved access tier");

        let stored = if complete {
            self.cache.put_if_current(wallet, (tier, vaults.clone()), generation)
        } else {
            None
        };
        if complete && stored.is_none() {
            debug!(wallet = %wallet, "Wallet invalidated during lookup, tier not cached");
        }

        Ok(ResolvedTier {
            tier,
            computed_at: stored.map(|c| c.computed_at).unwrap_or_else(Utc::now),
            cached: false,
            delegated,
            vaults,
        })
    }

    /// Highest tier across the wallet's vaults, the vaults that grant
    /// access, and whether every read succeeded.
    async fn best_vault_tier(
        &self,
        wallet: Address,
        delegations: &DelegationResolver,
    ) -> (AccessTier, Vec<Address>, bool) {
        let lookup = delegations.lookup(wallet).await;
        let mut best = AccessTier::Denied;
        let mut granting = Vec::new();
        let mut complete = lookup.complete;

        for vault in lookup.vaults {
            match with_timeout(self.call_timeout, self.ledger.check_access(vault)).await {
                Ok(tier) => {
                    if tier.grants_access() {
                        granting.push(vault);
                    }
                    best = best.max(tier);
                    if best.is_ceiling() {
                        return (best, granting, true);
                    }
                }
                Err(e) => {
                    complete = false;
                    warn!(
                        wallet = %wallet,
                        vault = %vault,
                        error = %e,
                        "Vault tier lookup failed, skipping vault"
                    );
                }
            }
        }

        (best, granting, complete)
    }

    /// Drop the cached tier for a wallet; the next resolve reads the ledger.
    pub fn invalidate(&self, wallet: &Address) {
        self.cache.invalidate(wallet);
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
