// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::access::TierResolver;
use crate::auth::ChallengeService;
use crate::blockchain::{LedgerWriter, SessionLedger};
use crate::nodes::NodeDirectory;
use crate::session::SessionGate;
use crate::tunnel::PeerManager;
use crate::watcher::WatcherState;

/// Components shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub challenges: Arc<ChallengeService>,
    pub tiers: Arc<TierResolver>,
    pub sessions: Arc<SessionGate>,
    pub peers: Arc<PeerManager>,
    /// Payment confirmation for paid-tier sessions.
    pub payments: Arc<dyn SessionLedger>,
    /// Present only when on-chain session writes are configured.
    pub writer: Option<LedgerWriter>,
    pub nodes: Arc<dyn NodeDirectory>,
    pub watcher: watch::Receiver<WatcherState>,
    pub ledger_timeout: Duration,
}
