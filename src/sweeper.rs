// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sweepers
//!
//! Periodic reclamation of expired state.
//!
//! - [`SessionSweep`] drops expired sessions and prunes expired challenge
//!   nonces
//! - [`PeerSweep`] tears down peers of revoked or expired sessions, evicts
//!   expired peers and refreshes byte counters. A teardown is skipped when
//!   the wallet has signed in again since it was issued.
//!
//! Each runs inside a [`Sweeper`], which repeats the sweep on an interval
//! until its `CancellationToken` fires. Tests call
//! [`Sweep::sweep_once`] directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::ChallengeService;
use crate::session::{SessionGate, TeardownReceiver};
use crate::tunnel::PeerManager;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// One unit of periodic cleanup.
#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one sweep. Returns how many items were reclaimed.
    async fn sweep_once(&self) -> usize;
}

/// Runs a [`Sweep`] on a fixed interval.
pub struct Sweeper<S> {
    task: S,
    interval: Duration,
}

impl<S: Sweep> Sweeper<S> {
    pub fn new(task: S, interval: Duration) -> Self {
        Self { task, interval }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        let name = self.task.name();
        info!(
            sweeper = name,
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!(sweeper = name, "Sweeper shutting down");
                    return;
                }
            }

            let reclaimed = self.task.sweep_once().await;
            if reclaimed > 0 {
                debug!(sweeper = name, reclaimed, "Sweep complete");
            }
        }
    }
}

/// Expired sessions and challenge nonces.
pub struct SessionSweep {
    sessions: Arc<SessionGate>,
    challenges: Arc<ChallengeService>,
}

impl SessionSweep {
    pub fn new(sessions: Arc<SessionGate>, challenges: Arc<ChallengeService>) -> Self {
        Self {
            sessions,
            challenges,
        }
    }
}

#[async_trait]
impl Sweep for SessionSweep {
    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn sweep_once(&self) -> usize {
        let sessions = self.sessions.sweep_expired().await;
        let nonces = self.challenges.prune_expired();
        if nonces > 0 {
            debug!(pruned = nonces, "Pruned expired challenge nonces");
        }
        sessions + nonces
    }
}

/// Peer teardown, expiry and counters.
pub struct PeerSweep {
    peers: Arc<PeerManager>,
    sessions: Arc<SessionGate>,
    teardowns: Mutex<TeardownReceiver>,
}

impl PeerSweep {
    pub fn new(
        peers: Arc<PeerManager>,
        sessions: Arc<SessionGate>,
        teardowns: TeardownReceiver,
    ) -> Self {
        Self {
            peers,
            sessions,
            teardowns: Mutex::new(teardowns),
        }
    }
}

#[async_trait]
impl Sweep for PeerSweep {
    fn name(&self) -> &'static str {
        "peers"
    }

    async fn sweep_once(&self) -> usize {
        let mut reclaimed = 0;

        {
            let mut teardowns = self.teardowns.lock().await;
            while let Ok(teardown) = teardowns.try_recv() {
                if self.sessions.superseded(&teardown).await {
                    debug!(wallet = %teardown.wallet, "Teardown skipped, wallet signed in again");
                    continue;
                }
                if self.peers.teardown_owner(&teardown.wallet).await.is_some() {
                    info!(wallet = %teardown.wallet, "Peer torn down after session ended");
                    reclaimed += 1;
                }
            }
        }

        reclaimed += self.peers.sweep_expired().await;

        if let Err(e) = self.peers.refresh_counters().await {
            warn!(error = %e, "Failed to refresh peer byte counters");
        }

        reclaimed
    }
}
