// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Gate
//!
//! Time-bounded credentials keyed by wallet.
//!
//! - At most one live session per wallet; creating a new one overwrites
//! - Expiry is checked on every read and reclaimed by the session sweeper
//! - Revoking or expiring a session notifies the peer manager through the
//!   teardown channel so the wallet's tunnel peer goes with it
//! - Every session carries a generation; a teardown names the newest
//!   generation it ends, so a session issued afterwards is left alone
//! - Sessions granted through a delegated vault remember the vault, for
//!   revocation when the vault's asset moves

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::access::AccessTier;

/// A live access credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub wallet: Address,
    pub tier: AccessTier,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Issue order across the gate, starting at 1.
    pub generation: u64,
    /// Vaults the tier was delegated through; empty for direct ownership.
    pub vaults: Vec<Address>,
    deadline: Instant,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the session expires.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("wallet {0} has no access tier")]
    Denied(Address),
}

/// A wallet whose sessions up to `generation` have ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teardown {
    pub wallet: Address,
    pub generation: u64,
}

/// Ended sessions; consumed by the peer sweeper.
pub type TeardownSender = mpsc::UnboundedSender<Teardown>;
pub type TeardownReceiver = mpsc::UnboundedReceiver<Teardown>;

struct SessionTable {
    sessions: HashMap<Address, Session>,
    /// Generation of the most recently issued session.
    issued: u64,
}

pub struct SessionGate {
    table: RwLock<SessionTable>,
    ttl: Duration,
    teardown: Option<TeardownSender>,
}

impl SessionGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: RwLock::new(SessionTable {
                sessions: HashMap::new(),
                issued: 0,
            }),
            ttl,
            teardown: None,
        }
    }

    /// Report ended sessions on `teardown`.
    pub fn with_teardown(mut self, teardown: TeardownSender) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Issue a session, replacing any existing one for the wallet.
    pub async fn create_session(
        &self,
        wallet: Address,
        tier: AccessTier,
    ) -> Result<Session, SessionError> {
        self.create_delegated_session(wallet, tier, Vec::new()).await
    }

    /// Issue a session whose tier came from `vaults`.
    pub async fn create_delegated_session(
        &self,
        wallet: Address,
        tier: AccessTier,
        vaults: Vec<Address>,
    ) -> Result<Session, SessionError> {
        if !tier.grants_access() {
            return Err(SessionError::Denied(wallet));
        }

        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .map(|ttl| created_at + ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut table = self.table.write().await;
        table.issued += 1;
        let session = Session {
            wallet,
            tier,
            created_at,
            expires_at,
            generation: table.issued,
            vaults,
            deadline: Instant::now() + self.ttl,
        };
        let replaced = table.sessions.insert(wallet, session.clone()).is_some();
        drop(table);

        info!(
            wallet = %wallet,
            tier = %tier,
            generation = session.generation,
            delegated = !session.vaults.is_empty(),
            replaced,
            "Session created"
        );
        Ok(session)
    }

    /// The wallet's session if it is still live. An expired session is
    /// removed on the way out.
    pub async fn get_session(&self, wallet: &Address) -> Option<Session> {
        {
            let table = self.table.read().await;
            match table.sessions.get(wallet) {
                None => return None,
                Some(session) if !session.is_expired() => return Some(session.clone()),
                Some(_) => {}
            }
        }

        let mut table = self.table.write().await;
        match table.sessions.get(wallet) {
            Some(session) if session.is_expired() => {
                table.sessions.remove(wallet);
                let generation = table.issued;
                drop(table);
                debug!(wallet = %wallet, "Session expired on access");
                self.notify_teardown(*wallet, generation);
                None
            }
            // Replaced by a fresh session between the two locks.
            other => other.cloned(),
        }
    }

    /// Delete the wallet's session and tear down its peer. Returns whether a
    /// session existed.
    pub async fn revoke(&self, wallet: &Address) -> bool {
        let (existed, generation) = {
            let mut table = self.table.write().await;
            (table.sessions.remove(wallet).is_some(), table.issued)
        };
        // The peer can outlive a lazily-expired session, so always notify.
        self.notify_teardown(*wallet, generation);
        if existed {
            info!(wallet = %wallet, "Session revoked");
        }
        existed
    }

    /// Remove every expired session. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let (expired, generation) = {
            let mut table = self.table.write().await;
            let expired: Vec<Address> = table
                .sessions
                .iter()
                .filter(|(_, s)| s.is_expired())
                .map(|(wallet, _)| *wallet)
                .collect();
            for wallet in &expired {
                table.sessions.remove(wallet);
            }
            (expired, table.issued)
        };

        for wallet in &expired {
            self.notify_teardown(*wallet, generation);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept expired sessions");
        }
        expired.len()
    }

    /// Number of unexpired sessions.
    pub async fn active_count(&self) -> usize {
        self.table
            .read()
            .await
            .sessions
            .values()
            .filter(|s| !s.is_expired())
            .count()
    }

    /// Wallets holding a live session granted through `vault`.
    pub async fn delegated_through(&self, vault: &Address) -> Vec<Address> {
        self.table
            .read()
            .await
            .sessions
            .values()
            .filter(|s| !s.is_expired() && s.vaults.contains(vault))
            .map(|s| s.wallet)
            .collect()
    }

    /// Whether a teardown is stale: the wallet got a session after it.
    pub async fn superseded(&self, teardown: &Teardown) -> bool {
        self.get_session(&teardown.wallet)
            .await
            .is_some_and(|session| session.generation > teardown.generation)
    }

    fn notify_teardown(&self, wallet: Address, generation: u64) {
        if let Some(tx) = &self.teardown {
            // Receiver gone means shutdown; nothing left to tear down.
            let _ = tx.send(Teardown { wallet, generation });
        }
    }
}
