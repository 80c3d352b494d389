// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Revocation Watcher
//!
//! Background task that follows transfers of the gated asset and withdraws
//! entitlements as soon as the asset moves.
//!
//! ## Strategy
//!
//! For every transfer:
//! 1. **Sender**: tier and delegation entries are invalidated and its
//!    session is revoked (which tears down its peer). Hot wallets whose
//!    session was granted through the sender, or whose cached vault set
//!    contains it, lose their session too.
//! 2. **Receiver**: cache entries are invalidated so the next sign-in sees
//!    the new holding. Nothing is revoked.
//!
//! ## Reconnecting
//!
//! `Disconnected → Subscribed → Disconnected (on error) → Subscribed` after a
//! fixed backoff, until the cancellation token fires. The current state is
//! published on a `watch` channel for the health endpoint.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::access::{DelegationResolver, TierResolver};
use crate::blockchain::{TransferEvent, TransferFeed};
use crate::session::SessionGate;

/// Default delay before resubscribing after a subscription error.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Disconnected,
    Subscribed,
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherState::Disconnected => write!(f, "disconnected"),
            WatcherState::Subscribed => write!(f, "subscribed"),
        }
    }
}

pub struct RevocationWatcher {
    feed: Arc<dyn TransferFeed>,
    tiers: Arc<TierResolver>,
    delegations: Option<Arc<DelegationResolver>>,
    sessions: Arc<SessionGate>,
    backoff: Duration,
    state: watch::Sender<WatcherState>,
}

impl RevocationWatcher {
    pub fn new(
        feed: Arc<dyn TransferFeed>,
        tiers: Arc<TierResolver>,
        delegations: Option<Arc<DelegationResolver>>,
        sessions: Arc<SessionGate>,
    ) -> Self {
        let (state, _) = watch::channel(WatcherState::Disconnected);
        Self {
            feed,
            tiers,
            delegations,
            sessions,
            backoff: DEFAULT_BACKOFF,
            state,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Receiver for state changes; stays valid after `run` consumes `self`.
    pub fn state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            backoff_secs = self.backoff.as_secs(),
            delegation = self.delegations.is_some(),
            "Revocation watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.feed.subscribe().await {
                Ok(mut events) => {
                    self.state.send_replace(WatcherState::Subscribed);
                    info!("Revocation watcher subscribed to transfer events");

                    loop {
                        tokio::select! {
                            item = events.recv() => match item {
                                Some(Ok(batch)) => {
                                    for event in &batch {
                                        self.apply(event).await;
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "Transfer subscription failed");
                                    break;
                                }
                                None => {
                                    warn!("Transfer subscription closed");
                                    break;
                                }
                            },
                            _ = shutdown.cancelled() => {
                                self.state.send_replace(WatcherState::Disconnected);
                                info!("Revocation watcher shutting down");
                                return;
                            }
                        }
                    }

                    self.state.send_replace(WatcherState::Disconnected);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to transfer events");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        self.state.send_replace(WatcherState::Disconnected);
        info!("Revocation watcher shutting down");
    }

    /// Apply one transfer. Returns how many sessions were revoked.
    pub async fn apply(&self, event: &TransferEvent) -> usize {
        let mut revoked = 0;

        if let Some(sender) = event.sender() {
            let mut delegates: BTreeSet<Address> = self.forget(&sender).into_iter().collect();
            delegates.extend(self.sessions.delegated_through(&sender).await);
            if self.sessions.revoke(&sender).await {
                revoked += 1;
            }
            for hot in delegates {
                self.forget(&hot);
                if self.sessions.revoke(&hot).await {
                    info!(wallet = %hot, vault = %sender, "Delegated session revoked after vault transfer");
                    revoked += 1;
                }
            }
        }

        if let Some(receiver) = event.receiver() {
            for hot in self.forget(&receiver) {
                self.tiers.invalidate(&hot);
            }
        }

        debug!(
            from = %event.from,
            to = %event.to,
            block = ?event.block_number,
            revoked,
            "Applied transfer"
        );
        revoked
    }

    /// Invalidate cached state for `wallet`. Returns hot wallets whose cached
    /// vault set includes it.
    fn forget(&self, wallet: &Address) -> Vec<Address> {
        self.tiers.invalidate(wallet);
        match &self.delegations {
            Some(delegations) => {
                delegations.invalidate(wallet);
                delegations.cached_delegates_of(wallet)
            }
            None => Vec::new(),
        }
    }
}
